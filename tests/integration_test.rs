use approx::assert_abs_diff_eq;

use csm2::drivers::exact_calculation::{
    ExactCalculationDriver, ExactCalculationParams, ExactCalculationResult,
};
use csm2::drivers::Csm2Driver;
use csm2::interfaces::input::Input;
use csm2::interfaces::InputHandle;
use csm2::io::read_csm2_yaml;
use csm2::operation::Operation;

const ROOT: &str = env!("CARGO_MANIFEST_DIR");

fn read_input(name: &str) -> Input {
    read_csm2_yaml::<Input, _>(format!("{ROOT}/tests/input/{name}")).unwrap()
}

fn run(params: &ExactCalculationParams, inp: &Input) -> ExactCalculationResult {
    let mol = inp.molecule.to_molecule().unwrap();
    let mut driver = ExactCalculationDriver::builder()
        .parameters(params)
        .molecule(&mol)
        .build()
        .unwrap();
    driver.run().unwrap();
    driver.result().unwrap().clone()
}

#[test]
fn test_integration_methane_c3_bond_preserving() {
    let inp = read_input("methane_c3.yml");
    inp.handle().unwrap();

    let res = run(&inp.exact_calculation, &inp);
    assert_abs_diff_eq!(res.best.csm, 0.0, epsilon = 1e-6);
    assert!(!res.best.is_chiral);
    assert!(res.completed);
    assert_eq!(res.best.permutation[0], 0);
    assert_eq!(res.best.operation, Operation::cn(3).unwrap());

    // A C-H bond of methane is a threefold axis.
    let direction = res.best.direction.normalize();
    let mol = inp.molecule.to_molecule().unwrap();
    assert!(mol.positions()[1..]
        .iter()
        .any(|q| (direction.dot(&q.normalize()).abs() - 1.0).abs() < 1e-6));
}

#[test]
fn test_integration_dimer_inversion_with_and_without_chains() {
    let inp = read_input("dimer_chains_ci.yml");
    let chained = run(&inp.exact_calculation, &inp);
    assert!(chained.best.csm > 1.0);
    assert!(chained.best.permutation[..2].iter().all(|&i| i < 2));
    assert!(chained.best.permutation[2..].iter().all(|&i| i >= 2));

    let mut unchained_inp = inp.clone();
    unchained_inp.molecule.use_chains = false;
    let unchained = run(&unchained_inp.exact_calculation, &unchained_inp);
    assert_abs_diff_eq!(unchained.best.csm, 0.0, epsilon = 1e-9);
    assert_eq!(unchained.best.permutation, vec![2, 3, 0, 1]);
    assert!(unchained.best.csm < chained.best.csm);
}

#[test]
fn test_integration_chirality_and_saved_result() {
    let inp = read_input("dimer_chains_ci.yml");
    let mut save_name = std::env::temp_dir();
    save_name.push(format!("csm2_integration_{}", std::process::id()));
    let mut params = inp.exact_calculation.clone();
    params.operation = Operation::ch();
    params.result_save_name = Some(save_name.clone());
    let res = run(&params, &inp);
    assert!(res.best.csm >= 0.0 && res.best.csm <= 100.0);

    save_name.set_extension("yml");
    let saved = read_csm2_yaml::<ExactCalculationResult, _>(&save_name).unwrap();
    assert_eq!(saved.best.permutation, res.best.permutation);
    assert_eq!(saved.best.operation, res.best.operation);
    assert_eq!(saved.statistics.perm_count, res.statistics.perm_count);
    assert_eq!(saved.parameters.operation, Operation::ch());
    std::fs::remove_file(&save_name).unwrap();
}
