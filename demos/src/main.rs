//! Obfuscates a small sample module and prints the before/after IR.
//!
//! ```sh
//! cargo run -p goron-demo
//! ```

use goron_core::interp::Machine;
use goron_core::ir::{
    BinOp, CmpOp, Const, FuncBuilder, Function, Global, Linkage, Module, Operand, Param, Ty,
};
use goron_core::seed::Seed;
use goron_transforms::{obfuscate_module, ObfuscationConfig};

/// Roughly:
///
/// ```c
/// static const char secret[] = "swordfish";
/// static int check(int len) { return len > 8 ? 1 : 0; }
/// int main(void) { return check(strlen(secret)); }
/// ```
fn sample_module() -> Module {
    let mut module = Module::new("demo");

    let mut text: Vec<u64> = b"swordfish".iter().map(|&b| u64::from(b)).collect();
    text.push(0);
    let len = text.len();
    module
        .add_global(Global::private_const(
            "secret",
            Ty::Array(Box::new(Ty::i8()), len),
            Const::Bytes {
                elem_bits: 8,
                data: text,
            },
        ))
        .expect("fresh module");

    module
        .add_function(Function::declaration(
            "strlen",
            vec![Param::new("p", Ty::i8().ptr_to())],
            Ty::Int(64),
        ))
        .expect("fresh module");

    let mut b = FuncBuilder::new("check", vec![Param::new("len", Ty::i32())], Ty::i32());
    let long_enough = b.icmp(CmpOp::Sgt, 32, Operand::Arg(0), FuncBuilder::const_i32(8));
    b.cond_br(Operand::Value(long_enough), "yes", "no");
    b.block("yes");
    b.ret(FuncBuilder::const_i32(1));
    b.block("no");
    b.ret(FuncBuilder::const_i32(0));
    let mut check = b.finish();
    check.linkage = Linkage::Internal;
    module.add_function(check).expect("fresh module");

    let mut b = FuncBuilder::new("main", vec![], Ty::i32());
    let n = b.call(
        "strlen",
        Ty::Int(64),
        vec![Operand::Const(Const::Gep {
            elem_ty: Ty::Array(Box::new(Ty::i8()), len),
            base: Box::new(Const::Global("secret".into())),
            indices: vec![0, 0],
        })],
    );
    let n32 = b.bin(BinOp::Add, 32, Operand::Value(n), FuncBuilder::const_i32(0));
    let r = b.call("check", Ty::i32(), vec![Operand::Value(n32)]);
    b.ret(Operand::Value(r));
    module.add_function(b.finish()).expect("fresh module");

    module
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let mut module = sample_module();
    println!("=== before ===\n{}", goron_core::ir::print_module(&module));

    let mut reference = Machine::new(&module).expect("well-formed module");
    let before = reference.call("main", &[]).expect("reference run");

    let config = ObfuscationConfig::with_seed(Seed::from_phrase("goron-demo"));
    let summary = obfuscate_module(&mut module, &config).expect("pipeline");

    println!("=== after ===\n{}", goron_core::ir::print_module(&module));
    println!(
        "resignatured {} function(s), rewrote {} branch(es), encrypted {} string(s)",
        summary.functions_resignatured, summary.branches_rewritten, summary.strings_encrypted
    );

    let mut machine = Machine::new(&module).expect("well-formed module");
    let after = machine.call("main", &[]).expect("obfuscated run");
    println!("main() before: {before:?}  after: {after:?}");
    assert_eq!(before, after, "obfuscation must preserve behavior");
}
