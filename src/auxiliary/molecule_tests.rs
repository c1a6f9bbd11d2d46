use approx::assert_abs_diff_eq;
use nalgebra::Point3;

use crate::auxiliary::atom::{Atom, ElementMap};
use crate::auxiliary::molecule::Molecule;

fn water() -> Vec<Atom> {
    let emap = ElementMap::new();
    vec![
        Atom::from_symbol(0, "O", Point3::new(0.0, 0.0, 0.1173), &emap)
            .unwrap()
            .adjacent_to(&[1, 2]),
        Atom::from_symbol(1, "H", Point3::new(0.0, 0.7572, -0.4692), &emap).unwrap(),
        Atom::from_symbol(2, "h", Point3::new(0.0, -0.7572, -0.4692), &emap).unwrap(),
    ]
}

#[test]
fn test_atom_from_symbol() {
    let emap = ElementMap::new();
    let cl = Atom::from_symbol(0, "cl", Point3::origin(), &emap).unwrap();
    assert_eq!(cl.atomic_symbol, "Cl");
    assert_abs_diff_eq!(cl.atomic_mass, 35.45, epsilon = 0.01);
    assert!(Atom::from_symbol(0, "Xx", Point3::origin(), &emap).is_err());
    let dummy = Atom::with_mass(3, "X", Point3::origin(), 2.5);
    assert_eq!(dummy.atomic_mass, 2.5);
}

#[test]
fn test_molecule_normalisation() {
    let mol = Molecule::from_atoms(water(), None, false, false).unwrap();
    assert_eq!(mol.n_atoms(), 3);
    let sum_sq = mol
        .positions()
        .iter()
        .map(|q| q.norm_squared())
        .sum::<f64>();
    assert_abs_diff_eq!(sum_sq, 1.0, epsilon = 1e-12);
    let centroid = mol.positions().iter().sum::<nalgebra::Vector3<f64>>();
    assert_abs_diff_eq!(centroid.norm(), 0.0, epsilon = 1e-12);
    assert_eq!(mol.equivalence_classes(), &[vec![0, 1, 2]]);

    let mol_mass = Molecule::from_atoms(water(), None, false, true).unwrap();
    assert!(mol_mass.centre()[2] > mol.centre()[2]);
    let sum_sq_mass = mol_mass
        .positions()
        .iter()
        .map(|q| q.norm_squared())
        .sum::<f64>();
    assert_abs_diff_eq!(sum_sq_mass, 1.0, epsilon = 1e-12);
}

#[test]
fn test_molecule_bonds_symmetrised() {
    let mol = Molecule::from_atoms(water(), None, false, false).unwrap();
    assert!(mol.has_bond(0, 1));
    assert!(mol.has_bond(1, 0));
    assert!(mol.has_bond(2, 0));
    assert!(!mol.has_bond(1, 2));
    assert_eq!(mol.adjacent(1), &[0]);
    assert_eq!(mol.adjacent(0), &[1, 2]);
    assert_eq!(mol.bonds().len(), 4);
}

#[test]
fn test_molecule_invalid_inputs() {
    let mut atoms = water();
    atoms[1].adjacent = vec![7];
    assert!(Molecule::from_atoms(atoms, None, false, false).is_err());

    let mut atoms = water();
    atoms[1].adjacent = vec![1];
    assert!(Molecule::from_atoms(atoms, None, false, false).is_err());

    assert!(Molecule::from_atoms(water(), Some(vec![vec![0], vec![1]]), false, false).is_err());
    assert!(
        Molecule::from_atoms(water(), Some(vec![vec![0, 1], vec![1, 2]]), false, false).is_err()
    );
    assert!(Molecule::from_atoms(water(), Some(vec![vec![0, 1, 2, 3]]), false, false).is_err());
    assert!(Molecule::from_atoms(water(), Some(vec![vec![0, 1, 2], vec![]]), false, false).is_err());
    assert!(Molecule::from_atoms(vec![], None, false, false).is_err());

    let coincident = vec![
        Atom::with_mass(0, "X", Point3::new(1.0, 1.0, 1.0), 1.0),
        Atom::with_mass(1, "X", Point3::new(1.0, 1.0, 1.0), 1.0),
    ];
    assert!(Molecule::from_atoms(coincident, None, false, false).is_err());

    let massless = vec![
        Atom::with_mass(0, "X", Point3::new(1.0, 0.0, 0.0), 0.0),
        Atom::with_mass(1, "X", Point3::new(-1.0, 0.0, 0.0), 0.0),
    ];
    assert!(Molecule::from_atoms(massless.clone(), None, false, true).is_err());
    let mol = Molecule::from_atoms(massless, None, false, false).unwrap();
    assert!(mol.positions().iter().all(|q| q.iter().all(|x| x.is_finite())));

    let cancelling = vec![
        Atom::with_mass(0, "X", Point3::new(1.0, 0.0, 0.0), 1.0),
        Atom::with_mass(1, "X", Point3::new(-1.0, 0.0, 0.0), -1.0),
    ];
    assert!(Molecule::from_atoms(cancelling, None, false, true).is_err());
}

#[test]
fn test_molecule_chains() {
    let atoms = (0..6)
        .map(|i| {
            let angle = std::f64::consts::PI * (i as f64) / 3.0;
            Atom::with_mass(i, "C", Point3::new(angle.cos(), angle.sin(), 0.0), 12.0).in_chain(
                if i % 2 == 0 { "A" } else { "B" },
            )
        })
        .collect::<Vec<_>>();

    let mol = Molecule::from_atoms(atoms.clone(), None, true, false).unwrap();
    assert_eq!(mol.equivalence_classes(), &[vec![0, 2, 4], vec![1, 3, 5]]);
    assert_eq!(mol.chains().unwrap().len(), 2);

    let mol = Molecule::from_atoms(
        atoms.clone(),
        Some(vec![vec![0, 1], vec![2, 3, 4, 5]]),
        true,
        false,
    )
    .unwrap();
    assert_eq!(
        mol.equivalence_classes(),
        &[vec![0], vec![1], vec![2, 4], vec![3, 5]]
    );

    // Uneven: class {0, 2, 1} holds two A atoms and one B atom.
    assert!(Molecule::from_atoms(
        atoms.clone(),
        Some(vec![vec![0, 2, 1], vec![3, 4, 5]]),
        true,
        false
    )
    .is_err());

    // Unlabelled atom.
    let mut unlabelled = atoms;
    unlabelled[3].chain = None;
    assert!(Molecule::from_atoms(unlabelled, None, true, false).is_err());
}
