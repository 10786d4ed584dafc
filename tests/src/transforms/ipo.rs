use goron_core::interp::{Machine, Val};
use goron_core::ir::{Const, Inst, Module, Operand, Ty};
use goron_core::seed::{Prng, Seed};
use goron_transforms::{IpoContext, Transform};

use crate::fixtures;

fn run_ipo(module: &mut Module) -> IpoContext {
    let seed = Seed::from_phrase("ipo-tests");
    let mut prng = Prng::from_seed(&seed);
    let mut ipo = IpoContext::new();
    assert!(ipo.apply(module, &mut prng).unwrap());
    ipo
}

#[test]
fn resignature_prefixes_a_secret_pointer_argument() {
    let mut module = fixtures::add_call_module();
    let ipo = run_ipo(&mut module);

    assert_eq!(ipo.resignatured(), &["add".to_string()]);
    let add = module.function("add").unwrap();
    assert_eq!(add.params.len(), 3);
    assert_eq!(add.params[0].name, "SecretArg");
    assert_eq!(add.params[0].ty, Ty::i32().ptr_to());
    assert_eq!(add.params[1].ty, Ty::i32());
    assert_eq!(add.params[2].ty, Ty::i32());

    // main was not eligible (external linkage) and keeps its signature
    assert!(module.function("main").unwrap().params.is_empty());
}

#[test]
fn call_sites_pass_the_callers_scratch_slot_first() {
    let mut module = fixtures::add_call_module();
    let ipo = run_ipo(&mut module);

    let caller_info = ipo.get_ipo_info("main").unwrap();
    let main = module.function("main").unwrap();
    let call = main
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .find_map(|inst| match inst {
            Inst::Call { args, .. } if args.len() == 3 => Some(args.clone()),
            _ => None,
        })
        .expect("rewritten call to add");
    assert_eq!(call[0], Operand::Value(caller_info.callee_slot));
    assert_eq!(call[1], Operand::Const(Const::i32(2)));
    assert_eq!(call[2], Operand::Const(Const::i32(3)));
}

#[test]
fn stored_secret_is_the_folded_difference_against_the_caller() {
    let mut module = fixtures::add_call_module();
    let ipo = run_ipo(&mut module);

    let caller = ipo.get_ipo_info("main").unwrap();
    let callee = ipo.get_ipo_info("add").unwrap();
    assert_ne!(caller.secret_ci, callee.secret_ci);

    // the only i32 constant the caller carries is CallerCI - CalleeCI; at
    // run time the subtraction against the live secret reproduces CalleeCI
    let main = module.function("main").unwrap();
    let folded = main
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .find_map(|inst| match inst {
            Inst::Bin {
                rhs: Operand::Const(Const::Int { value, .. }),
                lhs: Operand::Value(lhs),
                ..
            } if *lhs == caller.secret_li => Some(*value as u32),
            _ => None,
        })
        .expect("derivation of the callee secret");
    assert_eq!(caller.secret_ci.wrapping_sub(folded), callee.secret_ci);
}

#[test]
fn caller_slot_of_resignatured_functions_is_erased() {
    let mut module = fixtures::add_call_module();
    let ipo = run_ipo(&mut module);

    let add = module.function("add").unwrap();
    let info = ipo.get_ipo_info("add").unwrap();
    assert_eq!(add.count_uses(info.caller_slot), 0);
    for block in &add.blocks {
        for inst in &block.insts {
            assert_ne!(inst.dest(), Some(info.caller_slot), "dead slot survived");
        }
    }
    // the secret now arrives through the argument
    assert!(matches!(
        add.entry().unwrap().insts[0],
        Inst::Load {
            ptr: Operand::Arg(0),
            ..
        }
    ));
}

#[test]
fn behavior_is_preserved_after_resignaturing() {
    let mut module = fixtures::add_call_module();
    run_ipo(&mut module);

    let mut machine = Machine::new(&module).unwrap();
    assert_eq!(machine.call("main", &[]).unwrap(), Some(Val::i32(5)));
}

#[test]
fn address_taken_functions_are_left_untouched() {
    let mut module = fixtures::fn_pointer_module();
    let ipo = run_ipo(&mut module);

    assert!(ipo.resignatured().is_empty());
    let g = module.function("g").unwrap();
    assert_eq!(g.params.len(), 1, "escaped function must keep its signature");
    assert_eq!(
        module.global("p").unwrap().init,
        Some(Const::Func("g".into()))
    );

    let mut machine = Machine::new(&module).unwrap();
    assert_eq!(machine.call("main", &[]).unwrap(), Some(Val::i32(41)));
}

#[test]
fn invoke_call_sites_are_rewritten_like_calls() {
    use crate::fixtures::FunctionExt;
    use goron_core::ir::{AttrList, BasicBlock, CallConv, Callee, FuncBuilder, Function, Param, Term};

    let mut module = Module::new("unwind");
    let mut b = FuncBuilder::new("may_throw", vec![Param::new("x", Ty::i32())], Ty::i32());
    b.ret(Operand::Arg(0));
    module.add_function(b.finish().linkage_internal()).unwrap();

    let mut main = Function::new("main", vec![], Ty::i32());
    let result = main.new_value();
    main.blocks.push(BasicBlock {
        label: "entry".into(),
        insts: vec![],
        term: Term::Invoke {
            dest: Some(result),
            callee: Callee::Direct("may_throw".into()),
            args: vec![Operand::Const(Const::i32(9))],
            ret_ty: Ty::i32(),
            cconv: CallConv::C,
            attrs: AttrList::default(),
            normal: "cont".into(),
            unwind: "cleanup".into(),
            dbg: None,
        },
    });
    main.blocks.push(BasicBlock {
        label: "cont".into(),
        insts: vec![],
        term: Term::Ret(Some(Operand::Value(result))),
    });
    main.blocks.push(BasicBlock {
        label: "cleanup".into(),
        insts: vec![],
        term: Term::Ret(Some(Operand::Const(Const::i32(255)))),
    });
    module.add_function(main).unwrap();

    let ipo = run_ipo(&mut module);
    assert_eq!(ipo.resignatured(), &["may_throw".to_string()]);

    let main = module.function("main").unwrap();
    let Term::Invoke { args, .. } = &main.entry().unwrap().term else {
        panic!("invoke must stay an invoke");
    };
    assert_eq!(args.len(), 2);
    assert_eq!(
        args[0],
        Operand::Value(ipo.get_ipo_info("main").unwrap().callee_slot)
    );

    let mut machine = Machine::new(&module).unwrap();
    assert_eq!(machine.call("main", &[]).unwrap(), Some(Val::i32(9)));
}

#[test]
fn secrets_chain_through_nested_internal_calls() {
    // main -> outer -> inner, all threading secrets
    use goron_core::ir::{BinOp, FuncBuilder, Param};
    use crate::fixtures::FunctionExt;

    let mut module = Module::new("chain");
    let mut b = FuncBuilder::new("inner", vec![Param::new("x", Ty::i32())], Ty::i32());
    let doubled = b.bin(BinOp::Add, 32, Operand::Arg(0), Operand::Arg(0));
    b.ret(Operand::Value(doubled));
    module.add_function(b.finish().linkage_internal()).unwrap();

    let mut b = FuncBuilder::new("outer", vec![Param::new("x", Ty::i32())], Ty::i32());
    let inner = b.call("inner", Ty::i32(), vec![Operand::Arg(0)]);
    let plus = b.bin(BinOp::Add, 32, Operand::Value(inner), FuncBuilder::const_i32(1));
    b.ret(Operand::Value(plus));
    module.add_function(b.finish().linkage_internal()).unwrap();

    let mut b = FuncBuilder::new("main", vec![], Ty::i32());
    let r = b.call("outer", Ty::i32(), vec![FuncBuilder::const_i32(20)]);
    b.ret(Operand::Value(r));
    module.add_function(b.finish()).unwrap();

    let ipo = run_ipo(&mut module);
    assert_eq!(ipo.resignatured().len(), 2);

    let mut machine = Machine::new(&module).unwrap();
    assert_eq!(machine.call("main", &[]).unwrap(), Some(Val::i32(41)));
}
