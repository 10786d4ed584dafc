//! Scenario modules shared across the suite.
//!
//! Each builder returns a fresh module equivalent to a small C program, so
//! tests can obfuscate a clone and compare evaluator behavior against the
//! original.

use goron_core::ir::{
    BinOp, CmpOp, Const, FuncBuilder, Function, Global, Linkage, Module, Operand, Param, Ty,
};

/// A private constant `[N x i8]` C-string global.
pub fn str_global(name: &str, text: &str) -> Global {
    let mut data: Vec<u64> = text.bytes().map(u64::from).collect();
    data.push(0);
    let len = data.len();
    Global::private_const(
        name,
        Ty::Array(Box::new(Ty::i8()), len),
        Const::Bytes { elem_bits: 8, data },
    )
}

/// The decayed `i8*` to a string global's first element.
pub fn str_ptr(name: &str, len: usize) -> Const {
    Const::Gep {
        elem_ty: Ty::Array(Box::new(Ty::i8()), len),
        base: Box::new(Const::Global(name.to_string())),
        indices: vec![0, 0],
    }
}

/// `static int add(int a, int b) { return a + b; }`
/// `int main() { return add(2, 3); }`
pub fn add_call_module() -> Module {
    let mut module = Module::new("add_call");

    let mut b = FuncBuilder::new(
        "add",
        vec![Param::new("a", Ty::i32()), Param::new("b", Ty::i32())],
        Ty::i32(),
    );
    let sum = b.bin(BinOp::Add, 32, Operand::Arg(0), Operand::Arg(1));
    b.ret(Operand::Value(sum));
    let add = b.finish().linkage_internal();
    module.add_function(add).unwrap();

    let mut b = FuncBuilder::new("main", vec![], Ty::i32());
    let r = b.call(
        "add",
        Ty::i32(),
        vec![FuncBuilder::const_i32(2), FuncBuilder::const_i32(3)],
    );
    b.ret(Operand::Value(r));
    module.add_function(b.finish()).unwrap();

    module
}

/// `static int f(int x) { if (x > 0) return 1; else return 2; }`
/// `int main() { return f(7) + f(-1); }`
pub fn branchy_module() -> Module {
    let mut module = Module::new("branchy");

    let mut b = FuncBuilder::new("f", vec![Param::new("x", Ty::i32())], Ty::i32());
    let cond = b.icmp(CmpOp::Sgt, 32, Operand::Arg(0), FuncBuilder::const_i32(0));
    b.cond_br(Operand::Value(cond), "then", "else");
    b.block("then");
    b.ret(FuncBuilder::const_i32(1));
    b.block("else");
    b.ret(FuncBuilder::const_i32(2));
    module.add_function(b.finish().linkage_internal()).unwrap();

    let mut b = FuncBuilder::new("main", vec![], Ty::i32());
    let pos = b.call("f", Ty::i32(), vec![FuncBuilder::const_i32(7)]);
    let neg = b.call("f", Ty::i32(), vec![FuncBuilder::const_i32(0xffff_ffff)]);
    let sum = b.bin(BinOp::Add, 32, Operand::Value(pos), Operand::Value(neg));
    b.ret(Operand::Value(sum));
    module.add_function(b.finish()).unwrap();

    module
}

/// `static const char s[] = "hello"; int main() { return strlen(s); }`
pub fn hello_module() -> Module {
    let mut module = Module::new("hello");
    module.add_global(str_global("s", "hello")).unwrap();
    module
        .add_function(Function::declaration(
            "strlen",
            vec![Param::new("p", Ty::i8().ptr_to())],
            Ty::Int(64),
        ))
        .unwrap();

    let mut b = FuncBuilder::new("main", vec![], Ty::Int(64));
    let n = b.call(
        "strlen",
        Ty::Int(64),
        vec![Operand::Const(str_ptr("s", 6))],
    );
    b.ret(Operand::Value(n));
    module.add_function(b.finish()).unwrap();

    module
}

/// Two same-shape strings selected by a phi and printed:
/// `puts(c ? "yes" : "nay")`. The phi's incoming operands reference the
/// string globals directly, which forces decrypt calls into the incoming
/// blocks rather than in front of the phi.
pub fn phi_strings_module() -> Module {
    let mut module = Module::new("phi_strings");
    module.add_global(str_global("yes", "yes")).unwrap();
    module.add_global(str_global("nay", "nay")).unwrap();
    module
        .add_function(Function::declaration(
            "puts",
            vec![Param::new("p", Ty::i8().ptr_to())],
            Ty::i32(),
        ))
        .unwrap();

    let arr4 = Ty::Array(Box::new(Ty::i8()), 4);
    let mut b = FuncBuilder::new("pick", vec![Param::new("c", Ty::i32())], Ty::i32());
    let cond = b.icmp(CmpOp::Ne, 32, Operand::Arg(0), FuncBuilder::const_i32(0));
    b.cond_br(Operand::Value(cond), "yes_bb", "nay_bb");
    b.block("yes_bb");
    b.br("join");
    b.block("nay_bb");
    b.br("join");
    b.block("join");
    let phi = b.phi(
        arr4.ptr_to(),
        vec![
            (Operand::Const(Const::Global("yes".into())), "yes_bb".into()),
            (Operand::Const(Const::Global("nay".into())), "nay_bb".into()),
        ],
    );
    let decayed = b.gep(
        arr4,
        Operand::Value(phi),
        vec![FuncBuilder::const_i32(0), FuncBuilder::const_i32(0)],
    );
    let r = b.call("puts", Ty::i32(), vec![Operand::Value(decayed)]);
    b.ret(Operand::Value(r));
    module.add_function(b.finish()).unwrap();

    module
}

/// `static int g(int x) { return x; } static int (*p)(int) = g;`
/// `int main() { return p(41); }` — `g`'s address escapes through `p`.
pub fn fn_pointer_module() -> Module {
    let mut module = Module::new("fn_pointer");

    let mut b = FuncBuilder::new("g", vec![Param::new("x", Ty::i32())], Ty::i32());
    b.ret(Operand::Arg(0));
    module.add_function(b.finish().linkage_internal()).unwrap();

    module
        .add_global(Global::private_mut(
            "p",
            Ty::i8().ptr_to(),
            Const::Func("g".into()),
        ))
        .unwrap();

    let mut b = FuncBuilder::new("main", vec![], Ty::i32());
    let target = b.load(Ty::i8().ptr_to(), Operand::Const(Const::Global("p".into())));
    let r = b.call_indirect(Operand::Value(target), Ty::i32(), vec![FuncBuilder::const_i32(41)]);
    b.ret(Operand::Value(r));
    module.add_function(b.finish()).unwrap();

    module
}

/// Branching through `f` plus a string read, so branch keys must come from
/// the threaded secrets while the string decrypts on first use.
pub fn combined_module() -> Module {
    let mut module = Module::new("combined");
    module.add_global(str_global("greet", "hello")).unwrap();
    module
        .add_function(Function::declaration(
            "strlen",
            vec![Param::new("p", Ty::i8().ptr_to())],
            Ty::Int(64),
        ))
        .unwrap();

    let mut b = FuncBuilder::new("f", vec![Param::new("x", Ty::i32())], Ty::i32());
    let cond = b.icmp(CmpOp::Sgt, 32, Operand::Arg(0), FuncBuilder::const_i32(0));
    b.cond_br(Operand::Value(cond), "then", "else");
    b.block("then");
    b.ret(FuncBuilder::const_i32(1));
    b.block("else");
    b.ret(FuncBuilder::const_i32(2));
    module.add_function(b.finish().linkage_internal()).unwrap();

    let mut b = FuncBuilder::new("main", vec![], Ty::Int(64));
    let pos = b.call("f", Ty::i32(), vec![FuncBuilder::const_i32(7)]);
    let neg = b.call("f", Ty::i32(), vec![FuncBuilder::const_i32(0xffff_ffff)]);
    let branches = b.bin(BinOp::Add, 32, Operand::Value(pos), Operand::Value(neg));
    let len = b.call(
        "strlen",
        Ty::Int(64),
        vec![Operand::Const(str_ptr("greet", 6))],
    );
    // fold both observations into one exit code: branches * 100 + len
    let scaled = b.bin(
        BinOp::Mul,
        32,
        Operand::Value(branches),
        FuncBuilder::const_i32(100),
    );
    let code = b.bin(BinOp::Add, 64, Operand::Value(scaled), Operand::Value(len));
    b.ret(Operand::Value(code));
    module.add_function(b.finish()).unwrap();

    module
}

/// A constant struct `{ i32, i8* }` whose pointer field references an
/// encryptable string, plus a main that reads the string through it.
pub fn struct_user_module() -> Module {
    let mut module = Module::new("user");
    module.add_global(str_global("s", "hello")).unwrap();

    let info_ty = Ty::Struct {
        name: None,
        fields: vec![Ty::i32(), Ty::i8().ptr_to()],
    };
    module
        .add_global(Global::private_const(
            "info",
            info_ty.clone(),
            Const::Struct {
                name: None,
                fields: vec![
                    Const::i32(7),
                    Const::Cast {
                        to: Ty::i8().ptr_to(),
                        val: Box::new(str_ptr("s", 6)),
                    },
                ],
            },
        ))
        .unwrap();
    module
        .add_function(Function::declaration(
            "strlen",
            vec![Param::new("p", Ty::i8().ptr_to())],
            Ty::Int(64),
        ))
        .unwrap();

    let mut b = FuncBuilder::new("main", vec![], Ty::Int(64));
    let field = b.gep(
        info_ty,
        Operand::Const(Const::Global("info".into())),
        vec![FuncBuilder::const_i32(0), FuncBuilder::const_i32(1)],
    );
    let text = b.load(Ty::i8().ptr_to(), Operand::Value(field));
    let n = b.call("strlen", Ty::Int(64), vec![Operand::Value(text)]);
    b.ret(Operand::Value(n));
    module.add_function(b.finish()).unwrap();

    module
}

/// Extension helpers for fixture construction.
pub trait FunctionExt {
    /// Mark the function `internal` and return it.
    fn linkage_internal(self) -> Function;
}

impl FunctionExt for Function {
    fn linkage_internal(mut self) -> Function {
        self.linkage = Linkage::Internal;
        self
    }
}
