use goron_core::interp::{Machine, Val};
use goron_core::ir::Linkage;

use crate::fixtures;

#[test]
fn scenario_modules_run_unobfuscated() {
    let module = fixtures::add_call_module();
    let mut machine = Machine::new(&module).unwrap();
    assert_eq!(machine.call("main", &[]).unwrap(), Some(Val::i32(5)));

    let module = fixtures::branchy_module();
    let mut machine = Machine::new(&module).unwrap();
    assert_eq!(machine.call("main", &[]).unwrap(), Some(Val::i32(3)));

    let module = fixtures::hello_module();
    let mut machine = Machine::new(&module).unwrap();
    assert_eq!(
        machine.call("main", &[]).unwrap().unwrap().as_int(),
        Some(5)
    );
}

#[test]
fn puts_shim_captures_branch_dependent_output() {
    let module = fixtures::phi_strings_module();
    let mut machine = Machine::new(&module).unwrap();
    machine.call("pick", &[Val::i32(1)]).unwrap();
    machine.call("pick", &[Val::i32(0)]).unwrap();
    assert_eq!(machine.stdout_utf8(), "yes\nnay\n");
}

#[test]
fn indirect_calls_resolve_function_pointers_from_globals() {
    let module = fixtures::fn_pointer_module();
    let mut machine = Machine::new(&module).unwrap();
    assert_eq!(machine.call("main", &[]).unwrap(), Some(Val::i32(41)));
}

#[test]
fn global_state_persists_across_calls_on_one_machine() {
    let module = fixtures::phi_strings_module();
    let mut machine = Machine::new(&module).unwrap();
    machine.call("pick", &[Val::i32(1)]).unwrap();
    machine.call("pick", &[Val::i32(1)]).unwrap();
    assert_eq!(machine.stdout_utf8(), "yes\nyes\n");
}

#[test]
fn internal_linkage_is_observable_on_fixture_functions() {
    // the fixtures must present eligible candidates to the passes
    let module = fixtures::add_call_module();
    assert_eq!(module.function("add").unwrap().linkage, Linkage::Internal);
    assert_eq!(module.function("main").unwrap().linkage, Linkage::External);
}
