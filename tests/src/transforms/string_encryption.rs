use goron_core::interp::{Machine, Val};
use goron_core::ir::{Const, Global, Inst, Module, Ty};
use goron_core::seed::{Prng, Seed};
use goron_transforms::{ObfuscationOptions, StringEncryption, Transform};

use crate::fixtures;
use crate::fixtures::str_global;

fn run_cse(module: &mut Module) -> StringEncryption {
    run_cse_with(module, ObfuscationOptions::default())
}

fn run_cse_with(module: &mut Module, options: ObfuscationOptions) -> StringEncryption {
    let seed = Seed::from_phrase("cse-tests");
    let mut prng = Prng::from_seed(&seed);
    let mut cse = StringEncryption::new(options);
    cse.apply(module, &mut prng).unwrap();
    cse
}

#[test]
fn plaintext_disappears_into_the_encrypted_pool() {
    let mut module = fixtures::hello_module();
    let cse = run_cse(&mut module);
    assert_eq!(cse.encrypted_count(), 1);

    // the original constant is gone; twin, flag, pool and decryptor exist
    assert!(module.global("s").is_none());
    assert!(module.global("dec0s").is_some());
    assert!(module.global("dec_status_0s").is_some());
    assert!(module.function("goron_decrypt_string_0").is_some());

    let pool = module.global("EncryptedStringTable").expect("pool");
    assert!(pool.is_const);
    let Some(Const::Bytes { data, .. }) = &pool.init else {
        panic!("pool must be a byte array");
    };
    // junk in [16,32) + key in [16,32) + 6 ciphertext bytes
    assert!(data.len() >= 16 + 16 + 6 && data.len() < 32 + 32 + 6);
    // the plaintext must not appear in the pool
    let bytes: Vec<u8> = data.iter().map(|&b| b as u8).collect();
    assert!(!bytes.windows(5).any(|w| w == b"hello"));
}

#[test]
fn decrypted_use_preserves_observable_behavior() {
    let mut module = fixtures::hello_module();
    run_cse(&mut module);

    let mut machine = Machine::new(&module).unwrap();
    assert_eq!(
        machine.call("main", &[]).unwrap().unwrap().as_int(),
        Some(5)
    );
    // the twin now holds the recovered plaintext, null included
    assert_eq!(machine.global_bytes("dec0s", 6).unwrap(), b"hello\0");
}

#[test]
fn decryption_is_idempotent() {
    let mut module = fixtures::hello_module();
    run_cse(&mut module);

    let mut machine = Machine::new(&module).unwrap();
    machine.call("main", &[]).unwrap();
    let first = machine.global_bytes("dec0s", 6).unwrap();
    let status = machine.global_bytes("dec_status_0s", 4).unwrap();
    assert_eq!(status, vec![1, 0, 0, 0]);

    machine.call("main", &[]).unwrap();
    assert_eq!(machine.global_bytes("dec0s", 6).unwrap(), first);
    assert_eq!(machine.global_bytes("dec_status_0s", 4).unwrap(), status);
}

#[test]
fn phi_uses_decrypt_in_the_incoming_blocks() {
    let mut module = fixtures::phi_strings_module();
    run_cse(&mut module);

    let pick = module.function("pick").unwrap();
    let join = pick.block("join").unwrap();
    assert!(
        matches!(join.insts.first(), Some(Inst::Phi { .. })),
        "nothing may be inserted in front of the phi"
    );
    let Some(Inst::Phi { incoming, .. }) = join.insts.first() else {
        unreachable!();
    };
    for (op, _) in incoming {
        let name = op.as_global().expect("phi still reads globals");
        assert!(name.starts_with("dec"), "operand must point at the twin");
    }
    // each incoming block carries its own decrypt call
    for pred in ["yes_bb", "nay_bb"] {
        let block = pick.block(pred).unwrap();
        assert!(
            block
                .insts
                .iter()
                .any(|i| matches!(i, Inst::Call { callee, .. }
                    if matches!(callee, goron_core::ir::Callee::Direct(n)
                        if n.starts_with("goron_decrypt_string_")))),
            "missing decrypt call in {pred}"
        );
    }

    let mut machine = Machine::new(&module).unwrap();
    machine.call("pick", &[Val::i32(1)]).unwrap();
    machine.call("pick", &[Val::i32(0)]).unwrap();
    assert_eq!(machine.stdout_utf8(), "yes\nnay\n");
}

#[test]
fn aggregate_users_get_a_lazy_initializer() {
    let mut module = fixtures::struct_user_module();
    run_cse(&mut module);

    assert!(module.function("global_variable_init_info").is_some());
    assert!(module.global("dec_info").is_some());
    assert!(module.global("dec_status_info").is_some());
    // both the aggregate and the string it embedded are swept
    assert!(module.global("info").is_none());
    assert!(module.global("s").is_none());

    let mut machine = Machine::new(&module).unwrap();
    assert_eq!(
        machine.call("main", &[]).unwrap().unwrap().as_int(),
        Some(5)
    );
}

#[test]
fn objc_selector_references_route_through_the_runtime() {
    let mut module = Module::new("objc");
    module.add_global(str_global("sel_name", "doWork")).unwrap();
    let mut sel = Global::private_mut(
        "OBJC_SELECTOR_REFERENCES_0",
        Ty::i8().ptr_to(),
        Const::Cast {
            to: Ty::i8().ptr_to(),
            val: Box::new(fixtures::str_ptr("sel_name", 7)),
        },
    );
    sel.externally_initialized = true;
    module.add_global(sel).unwrap();
    module
        .add_function(goron_core::ir::Function::declaration(
            "strlen",
            vec![goron_core::ir::Param::new("p", Ty::i8().ptr_to())],
            Ty::Int(64),
        ))
        .unwrap();

    let mut b = goron_core::ir::FuncBuilder::new("main", vec![], Ty::Int(64));
    let sel_ptr = b.load(
        Ty::i8().ptr_to(),
        goron_core::ir::Operand::Const(Const::Global("OBJC_SELECTOR_REFERENCES_0".into())),
    );
    let n = b.call(
        "strlen",
        Ty::Int(64),
        vec![goron_core::ir::Operand::Value(sel_ptr)],
    );
    b.ret(goron_core::ir::Operand::Value(n));
    module.add_function(b.finish()).unwrap();

    run_cse(&mut module);

    assert!(module
        .function("global_variable_init_OBJC_SELECTOR_REFERENCES_0")
        .is_some());
    assert!(module.function("sel_registerName").is_some());

    let mut machine = Machine::new(&module).unwrap();
    assert_eq!(
        machine.call("main", &[]).unwrap().unwrap().as_int(),
        Some(6)
    );
}

#[test]
fn empty_arrays_and_non_strings_are_not_interned() {
    let mut module = Module::new("edge");
    // embedded null: not a C string
    module
        .add_global(Global::private_const(
            "raw",
            Ty::Array(Box::new(Ty::i8()), 4),
            Const::Bytes {
                elem_bits: 8,
                data: vec![1, 0, 2, 0],
            },
        ))
        .unwrap();
    // zero-length array: rejected
    module
        .add_global(Global::private_const(
            "empty",
            Ty::Array(Box::new(Ty::i8()), 0),
            Const::Bytes {
                elem_bits: 8,
                data: vec![],
            },
        ))
        .unwrap();
    // mutable data: rejected
    module
        .add_global(Global::private_mut(
            "buf",
            Ty::Array(Box::new(Ty::i8()), 3),
            Const::Bytes {
                elem_bits: 8,
                data: vec![b'h' as u64, b'i' as u64, 0],
            },
        ))
        .unwrap();

    let cse = run_cse(&mut module);
    assert_eq!(cse.encrypted_count(), 0);
    assert!(module.global("EncryptedStringTable").is_none());
    assert!(module.global("raw").is_some());
    assert!(module.global("empty").is_some());
    assert!(module.global("buf").is_some());
}

#[test]
fn skipped_functions_keep_their_plaintext_and_unused_helpers_vanish() {
    let mut module = fixtures::hello_module();
    let options = ObfuscationOptions {
        skip_functions: vec!["main".into()],
        ..Default::default()
    };
    run_cse_with(&mut module, options);

    // the only user was skipped: the plaintext global survives and the
    // synthesized helpers for it are reclaimed
    assert!(module.global("s").is_some());
    assert!(module.function("goron_decrypt_string_0").is_none());
    assert!(module.global("dec0s").is_none());
    assert!(module.global("dec_status_0s").is_none());

    let mut machine = Machine::new(&module).unwrap();
    assert_eq!(
        machine.call("main", &[]).unwrap().unwrap().as_int(),
        Some(5)
    );
}
