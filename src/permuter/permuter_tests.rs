use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::Instant;

use approx::assert_abs_diff_eq;
use itertools::Itertools;
use nalgebra::{Matrix3, Point3, Vector3};
use num_traits::Pow;
use proptest::prelude::*;

use crate::auxiliary::atom::Atom;
use crate::auxiliary::molecule::Molecule;
use crate::operation::Operation;
use crate::permutation::Permutation;
use crate::permuter::legality::LegalityPolicy;
use crate::permuter::pip::Pip;
use crate::permuter::{
    estimate_permutation_count, ConstrainedPermuter, Permuter, SinglePermPermuter, TimeoutCheck,
};

fn build_molecule(
    coords: &[[f64; 3]],
    bonds: &[(usize, usize)],
    classes: Option<Vec<Vec<usize>>>,
) -> Molecule {
    let atoms = coords
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let adjacent = bonds
                .iter()
                .filter_map(|&(a, b)| if a == i { Some(b) } else { None })
                .collect_vec();
            Atom::with_mass(i, "C", Point3::new(c[0], c[1], c[2]), 12.0).adjacent_to(&adjacent)
        })
        .collect_vec();
    Molecule::from_atoms(atoms, classes, false, false).unwrap()
}

fn tetrahedron() -> Molecule {
    build_molecule(
        &[
            [1.0, 1.0, 1.0],
            [1.0, -1.0, -1.0],
            [-1.0, 1.0, -1.0],
            [-1.0, -1.0, 1.0],
        ],
        &[],
        None,
    )
}

/// Computes A and B of a complete permutation from scratch.
fn brute_force_a_b(
    positions: &[Vector3<f64>],
    perm: &Permutation,
    operation: &Operation,
) -> (Matrix3<f64>, Vector3<f64>) {
    let trig = operation.trig_tables();
    let mut a = Matrix3::zeros();
    let mut b = Vector3::zeros();
    for k in 1..operation.order() {
        let pk = perm.pow(k);
        for (i, &j) in pk.image().iter().enumerate() {
            let qi = positions[i];
            let qj = positions[j];
            a += (qi * qj.transpose() + qj * qi.transpose()) * trig.multiplier[k];
            b += qi.cross(&qj) * trig.sin_theta[k];
        }
    }
    (a, b)
}

#[test]
fn test_permuter_tetrahedron_c3_enumeration() {
    let mol = tetrahedron();
    let c3 = Operation::cn(3).unwrap();
    let mut permuter = ConstrainedPermuter::new(&mol, &c3, LegalityPolicy::Unconstrained).unwrap();
    let mut perms = vec![];
    let flow = permuter.permute(&mut |pip| {
        let image = pip.permutation().unwrap();
        let perm = Permutation::from_image(&image).unwrap();
        assert!(perm.cycle_pattern().iter().all(|len| [1, 3].contains(len)));
        for k in 0..3 {
            assert_eq!(&pip.powers()[k], (&perm).pow(k).image());
        }
        let (a, b) = brute_force_a_b(mol.positions(), &perm, &c3);
        assert_abs_diff_eq!(*pip.a(), a, epsilon = 1e-12);
        assert_abs_diff_eq!(*pip.b(), b, epsilon = 1e-12);
        perms.push(image);
        ControlFlow::Continue(())
    });
    assert!(flow.is_continue());
    assert_eq!(perms.len(), 9);
    assert_eq!(perms.iter().unique().count(), 9);
    assert_eq!(perms[0], vec![0, 1, 2, 3]);
    assert_eq!(permuter.statistics().perm_count, 9);
    assert_eq!(permuter.statistics().dead_ends, 0);
    assert!(!permuter.statistics().timed_out);
    assert!(permuter.pip().is_empty());
    assert_eq!(
        estimate_permutation_count(mol.equivalence_classes(), &c3),
        9.0
    );
}

#[test]
fn test_permuter_respects_equivalence_classes() {
    let mol = build_molecule(
        &[
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [-1.0, 0.2, 0.0],
            [0.0, -1.0, 0.3],
            [0.1, 0.0, -1.0],
        ],
        &[],
        Some(vec![vec![0, 1, 2], vec![3, 4, 5]]),
    );
    let cs = Operation::cs();
    let mut permuter = ConstrainedPermuter::new(&mol, &cs, LegalityPolicy::Unconstrained).unwrap();
    let mut count = 0;
    let _ = permuter.permute(&mut |pip| {
        let image = pip.permutation().unwrap();
        assert!(image[..3].iter().all(|&i| i < 3));
        assert!(image[3..].iter().all(|&i| i >= 3));
        let perm = Permutation::from_image(&image).unwrap();
        assert!(perm.cycle_pattern().iter().all(|&len| len <= 2));
        count += 1;
        ControlFlow::Continue(())
    });
    assert_eq!(count, 16);
    assert_eq!(
        estimate_permutation_count(mol.equivalence_classes(), &cs),
        16.0
    );
}

#[test]
fn test_permuter_sn_cycle_lengths() {
    let coords = (0..4)
        .map(|i| {
            let phi = std::f64::consts::FRAC_PI_2 * (i as f64);
            [phi.cos(), phi.sin(), if i % 2 == 0 { 0.3 } else { -0.3 }]
        })
        .collect_vec();
    let mol = build_molecule(&coords, &[], None);
    let s4 = Operation::sn(4).unwrap();
    let mut permuter = ConstrainedPermuter::new(&mol, &s4, LegalityPolicy::Unconstrained).unwrap();
    let mut patterns = HashSet::new();
    let _ = permuter.permute(&mut |pip| {
        let perm = Permutation::from_image(&pip.permutation().unwrap()).unwrap();
        patterns.insert(perm.cycle_pattern());
        ControlFlow::Continue(())
    });
    // Cycle lengths 1, 2 and 4 are admissible, 3 is not.
    assert!(patterns.contains(&vec![4]));
    assert!(patterns.contains(&vec![2, 2]));
    assert!(patterns.contains(&vec![2, 1, 1]));
    assert!(!patterns.contains(&vec![3, 1]));
    // All 24 permutations of 4 atoms except the 8 with a 3-cycle.
    assert_eq!(permuter.statistics().perm_count, 16);
    assert_eq!(
        estimate_permutation_count(mol.equivalence_classes(), &s4),
        16.0
    );
}

#[test]
fn test_permuter_bond_preserving_square() {
    let mol = build_molecule(
        &[
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.0, -1.0, 0.0],
        ],
        &[(0, 1), (1, 2), (2, 3), (3, 0)],
        None,
    );
    let c4 = Operation::cn(4).unwrap();
    for policy in [
        LegalityPolicy::BondPreserving,
        LegalityPolicy::BondPreservingTwoSided,
    ] {
        let mut permuter = ConstrainedPermuter::new(&mol, &c4, policy).unwrap();
        let mut perms = HashSet::new();
        let _ = permuter.permute(&mut |pip| {
            let image = pip.permutation().unwrap();
            for &(i, j) in pip.molecule().bonds().iter() {
                assert!(pip.molecule().has_bond(image[i], image[j]));
            }
            perms.insert(image);
            ControlFlow::Continue(())
        });
        let expected = HashSet::from([vec![0, 1, 2, 3], vec![1, 2, 3, 0], vec![3, 0, 1, 2]]);
        assert_eq!(perms, expected);
        assert!(permuter.statistics().dead_ends > 0);
        assert!(permuter.pip().is_empty());
    }
}

#[test]
fn test_legality_rejects_bond_breaking_mapping() {
    let mol = build_molecule(
        &[
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 2.0, 0.0],
        ],
        &[(0, 1), (2, 3)],
        None,
    );
    let c2 = Operation::cn(2).unwrap();
    let mut pip = Pip::new(&mol, &c2, LegalityPolicy::BondPreserving);
    assert!(pip.switch(1, 1));
    // Atom 0 is bonded to atom 1, which stays in place, but atom 2 is not bonded to atom 1.
    assert!(!LegalityPolicy::BondPreserving.is_legal(&pip, 0, 2));
    assert!(!pip.switch(0, 2));
    assert_eq!(pip.forward(0), None);
    assert_eq!(pip.inverse(2), None);
    assert_eq!(pip.a(), &Matrix3::zeros());
    assert_eq!(pip.b(), &Vector3::zeros());
    assert!(LegalityPolicy::Unconstrained.is_legal(&pip, 0, 2));
    assert!(pip.switch(0, 0));
    pip.unswitch(0, 0);
    pip.unswitch(1, 1);
    assert!(pip.is_empty());
}

#[test]
fn test_legality_two_sided() {
    let mol = build_molecule(
        &[
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 2.0, 0.0],
        ],
        &[(0, 1)],
        None,
    );
    let c2 = Operation::cn(2).unwrap();
    let mut pip = Pip::new(&mol, &c2, LegalityPolicy::BondPreservingTwoSided);
    assert!(pip.switch(3, 0));
    // Atom 1 is bonded to atom 0, whose preimage 3 is not bonded to atom 2.
    assert!(LegalityPolicy::BondPreserving.is_legal(&pip, 2, 1));
    assert!(!LegalityPolicy::BondPreservingTwoSided.is_legal(&pip, 2, 1));
    assert!(!pip.switch(2, 1));
}

#[test]
fn test_pip_switch_occupied_slots() {
    let mol = tetrahedron();
    let mut pip = Pip::new(&mol, &Operation::cn(3).unwrap(), LegalityPolicy::Unconstrained);
    assert!(pip.switch(0, 1));
    // Atom 0 is already mapped and atom 1 is already taken.
    assert!(!pip.switch(0, 2));
    assert!(!pip.switch(3, 1));
    assert_eq!(pip.forward(0), Some(1));
    assert_eq!(pip.inverse(1), Some(0));
    assert_eq!(pip.forward(3), None);
    assert_eq!(pip.inverse(2), None);
    pip.unswitch(0, 1);
    assert!(pip.is_empty());
}

#[test]
#[should_panic]
fn test_pip_unswitch_unheld_mapping() {
    let mol = tetrahedron();
    let mut pip = Pip::new(&mol, &Operation::ci(), LegalityPolicy::Unconstrained);
    pip.unswitch(0, 1);
}

#[test]
fn test_pip_close_unclose_bit_identical() {
    let mol = build_molecule(
        &[
            [0.3, 1.2, -0.7],
            [1.1, -0.4, 0.2],
            [-0.9, 0.5, 0.8],
            [0.2, -1.3, -0.1],
            [-0.6, -0.2, 1.4],
        ],
        &[],
        None,
    );
    let c3 = Operation::cn(3).unwrap();
    let mut pip = Pip::new(&mol, &c3, LegalityPolicy::Unconstrained);
    assert!(pip.switch(3, 3));
    let fixed = pip.close_cycle(&[3], mol.positions());

    let a_before = *pip.a();
    let b_before = *pip.b();
    let powers_before = pip.powers().to_vec();

    assert!(pip.switch(0, 1));
    assert!(pip.switch(1, 2));
    assert!(pip.switch(2, 0));
    let checkpoint = pip.close_cycle(&[0, 1, 2], mol.positions());
    assert_ne!(pip.a(), &a_before);
    assert_eq!(pip.powers()[1][0], 1);
    assert_eq!(pip.powers()[2][0], 2);

    pip.unclose_cycle(checkpoint);
    assert_eq!(pip.a(), &a_before);
    assert_eq!(pip.b(), &b_before);
    assert_eq!(pip.powers(), powers_before.as_slice());

    pip.unswitch(2, 0);
    pip.unswitch(1, 2);
    pip.unswitch(0, 1);
    pip.unclose_cycle(fixed);
    pip.unswitch(3, 3);
    assert!(pip.is_empty());
    assert_eq!(pip.a(), &Matrix3::zeros());
}

#[test]
fn test_single_perm_permuter() {
    let mol = build_molecule(
        &[
            [0.0, 0.0, 0.0],
            [1.3, 0.1, 0.0],
            [-0.2, 0.9, 0.4],
            [0.5, -0.7, 1.1],
            [-1.1, -0.3, -0.6],
        ],
        &[(0, 1)],
        None,
    );
    let c2 = Operation::cn(2).unwrap();
    let mut permuter = SinglePermPermuter::new(&mol, &c2, &[0, 1, 2, 3, 4]).unwrap();
    let mut visits = 0;
    let _ = permuter.permute(&mut |pip| {
        assert_eq!(pip.permutation().unwrap(), vec![0, 1, 2, 3, 4]);
        visits += 1;
        ControlFlow::Continue(())
    });
    assert_eq!(visits, 1);
    assert_eq!(permuter.statistics().perm_count, 1);
    assert_eq!(permuter.statistics().branches, 0);
    assert_eq!(permuter.statistics().dead_ends, 0);

    // Legality is not consulted for a user-supplied permutation.
    let perm = [2, 3, 1, 0, 4];
    let permuter = SinglePermPermuter::new(&mol, &Operation::cn(4).unwrap(), &perm).unwrap();
    assert_eq!(permuter.pip().permutation().unwrap(), perm.to_vec());

    assert!(SinglePermPermuter::new(&mol, &c2, &[0, 1, 2, 3]).is_err());
    assert!(SinglePermPermuter::new(&mol, &c2, &[0, 1, 2, 3, 3]).is_err());
    assert!(SinglePermPermuter::new(&mol, &c2, &[0, 1, 2, 3, 5]).is_err());
    assert!(SinglePermPermuter::new(&mol, &Operation::ch(), &[0, 1, 2, 3, 4]).is_err());
    assert!(ConstrainedPermuter::new(&mol, &Operation::ch(), LegalityPolicy::Unconstrained).is_err());
}

#[test]
fn test_permuter_early_stop_and_deadline() {
    let mol = tetrahedron();
    let c3 = Operation::cn(3).unwrap();

    let mut permuter = ConstrainedPermuter::new(&mol, &c3, LegalityPolicy::Unconstrained).unwrap();
    let flow = permuter.permute(&mut |_| ControlFlow::Break(()));
    assert!(flow.is_break());
    assert_eq!(permuter.statistics().perm_count, 1);
    assert!(!permuter.statistics().timed_out);
    assert!(permuter.pip().is_empty());

    for check in [TimeoutCheck::Coarse, TimeoutCheck::Fine] {
        let mut permuter = ConstrainedPermuter::new(&mol, &c3, LegalityPolicy::Unconstrained)
            .unwrap()
            .with_deadline(Some(Instant::now()), check);
        let flow = permuter.permute(&mut |_| ControlFlow::Continue(()));
        assert!(flow.is_break());
        assert_eq!(permuter.statistics().perm_count, 0);
        assert!(permuter.statistics().timed_out);
        assert!(permuter.pip().is_empty());
    }
}

#[test]
fn test_estimate_permutation_count() {
    let groups = vec![(0..5).collect_vec(), (5..7).collect_vec()];
    // a(5) = 26 and a(2) = 2 for involutions.
    assert_eq!(estimate_permutation_count(&groups, &Operation::ci()), 52.0);
    // Only the identity is admissible for C7 on groups smaller than 7.
    assert_eq!(
        estimate_permutation_count(&groups, &Operation::cn(7).unwrap()),
        1.0
    );
    // a(5) = 1 + 4! = 25 for C5.
    assert_eq!(
        estimate_permutation_count(&groups[..1], &Operation::cn(5).unwrap()),
        25.0
    );
}

fn operation_pool() -> Vec<Operation> {
    vec![
        Operation::cn(2).unwrap(),
        Operation::cn(3).unwrap(),
        Operation::cn(5).unwrap(),
        Operation::sn(2).unwrap(),
        Operation::sn(4).unwrap(),
        Operation::sn(6).unwrap(),
        Operation::cs(),
        Operation::ci(),
    ]
}

proptest! {
    #[test]
    fn test_pip_incremental_accumulation_matches_brute_force(
        image in Just((0..6).collect::<Vec<usize>>()).prop_shuffle(),
        coords in prop::collection::vec(
            (-2.0f64..2.0, -2.0f64..2.0, -2.0f64..2.0), 6
        ),
        iop in 0usize..8,
    ) {
        let coords = coords.iter().map(|&(x, y, z)| [x, y, z]).collect_vec();
        let mol = build_molecule(&coords, &[], None);
        let operation = operation_pool()[iop].clone();
        let permuter = SinglePermPermuter::new(&mol, &operation, &image).unwrap();
        let perm = Permutation::from_image(&image).unwrap();
        let (a, b) = brute_force_a_b(mol.positions(), &perm, &operation);
        let pip = permuter.pip();
        for k in 0..operation.order() {
            let perm_k = (&perm).pow(k);
            prop_assert_eq!(&pip.powers()[k], perm_k.image());
        }
        prop_assert!((pip.a() - a).norm() < 1e-10);
        prop_assert!((pip.b() - b).norm() < 1e-10);
        prop_assert!((pip.a() - pip.a().transpose()).norm() < 1e-12);
    }
}
