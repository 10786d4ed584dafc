//! Textual rendering of modules.
//!
//! The output is assembly-flavored and stable: two structurally identical
//! modules print identically, which is what the determinism tests compare.

use std::fmt::Write;

use super::consts::Const;
use super::function::{Function, Linkage};
use super::inst::{BinOp, Callee, CmpOp, Inst, Operand, Term, ValueId};
use super::module::{Global, Module};
use super::types::Ty;

/// Render a whole module.
pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; module '{}'", module.name);
    for global in &module.globals {
        out.push_str(&print_global(global));
        out.push('\n');
    }
    if !module.compiler_used.is_empty() {
        let names: Vec<String> = module
            .compiler_used
            .iter()
            .map(|n| format!("@{n}"))
            .collect();
        let _ = writeln!(out, "; compiler.used: {}", names.join(", "));
    }
    for func in &module.functions {
        out.push('\n');
        out.push_str(&print_function(func));
    }
    out
}

fn linkage_str(linkage: Linkage) -> &'static str {
    match linkage {
        Linkage::External => "",
        Linkage::Internal => "internal ",
        Linkage::Private => "private ",
        Linkage::Linkonce => "linkonce ",
    }
}

fn print_global(global: &Global) -> String {
    let kind = if global.is_const { "constant" } else { "global" };
    let init = match &global.init {
        Some(c) => format!(" {}", print_const(c)),
        None => String::new(),
    };
    format!(
        "@{} = {}{} {}{}, align {}",
        global.name,
        linkage_str(global.linkage),
        kind,
        print_ty(&global.ty),
        init,
        global.align
    )
}

/// Render one function definition or declaration.
pub fn print_function(func: &Function) -> String {
    let mut out = String::new();
    let params: Vec<String> = func
        .params
        .iter()
        .map(|p| {
            let attrs = if p.attrs.is_empty() {
                String::new()
            } else {
                format!(" {}", p.attrs.join(" "))
            };
            format!("{}{} %{}", print_ty(&p.ty), attrs, p.name)
        })
        .collect();
    let varargs = if func.varargs { ", ..." } else { "" };
    let section = func
        .section
        .as_ref()
        .map(|s| format!(" section \"{s}\""))
        .unwrap_or_default();

    if func.is_declaration() {
        let _ = writeln!(
            out,
            "declare {} @{}({}{})",
            print_ty(&func.ret),
            func.name,
            params.join(", "),
            varargs
        );
        return out;
    }

    let _ = writeln!(
        out,
        "define {}{} @{}({}{}){} {{",
        linkage_str(func.linkage),
        print_ty(&func.ret),
        func.name,
        params.join(", "),
        varargs,
        section
    );
    for block in &func.blocks {
        let _ = writeln!(out, "{}:", block.label);
        for inst in &block.insts {
            let _ = writeln!(out, "  {}", print_inst(func, inst));
        }
        let _ = writeln!(out, "  {}", print_term(func, &block.term));
    }
    out.push_str("}\n");
    out
}

fn print_ty(ty: &Ty) -> String {
    match ty {
        Ty::Void => "void".into(),
        Ty::Int(bits) => format!("i{bits}"),
        Ty::Ptr(inner) => format!("{}*", print_ty(inner)),
        Ty::Array(elem, len) => format!("[{} x {}]", len, print_ty(elem)),
        Ty::Struct {
            name: Some(name), ..
        } => format!("%{name}"),
        Ty::Struct { fields, .. } => {
            let fields: Vec<String> = fields.iter().map(print_ty).collect();
            format!("{{ {} }}", fields.join(", "))
        }
        Ty::Fn(sig) => {
            let params: Vec<String> = sig.params.iter().map(print_ty).collect();
            format!("{} ({})", print_ty(&sig.ret), params.join(", "))
        }
    }
}

fn print_const(c: &Const) -> String {
    match c {
        Const::Int { value, .. } => format!("{value}"),
        Const::Null(_) => "null".into(),
        Const::Zero(_) => "zeroinitializer".into(),
        Const::Bytes { data, .. } => {
            let mut s = String::from("c\"");
            for &b in data {
                match u8::try_from(b) {
                    Ok(b) if (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\' => {
                        s.push(b as char)
                    }
                    _ => {
                        let _ = write!(s, "\\{b:02x}");
                    }
                }
            }
            s.push('"');
            s
        }
        Const::Array { elems, .. } => {
            let elems: Vec<String> = elems.iter().map(print_const).collect();
            format!("[{}]", elems.join(", "))
        }
        Const::Struct { fields, .. } => {
            let fields: Vec<String> = fields.iter().map(print_const).collect();
            format!("{{ {} }}", fields.join(", "))
        }
        Const::Global(name) => format!("@{name}"),
        Const::Func(name) => format!("@{name}"),
        Const::BlockAddr { func, block } => format!("blockaddress(@{func}, %{block})"),
        Const::Gep {
            elem_ty,
            base,
            indices,
        } => {
            let indices: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
            format!(
                "getelementptr({}, {}, {})",
                print_ty(elem_ty),
                print_const(base),
                indices.join(", ")
            )
        }
        Const::Cast { to, val } => format!("bitcast({} to {})", print_const(val), print_ty(to)),
    }
}

fn value_str(func: &Function, v: ValueId) -> String {
    match func.value_name(v) {
        Some(name) => format!("%{name}"),
        None => format!("%v{}", v.0),
    }
}

fn operand_str(func: &Function, op: &Operand) -> String {
    match op {
        Operand::Value(v) => value_str(func, *v),
        Operand::Arg(i) => match func.params.get(*i as usize) {
            Some(p) => format!("%{}", p.name),
            None => format!("%arg{i}"),
        },
        Operand::Const(c) => print_const(c),
    }
}

fn bin_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
        BinOp::URem => "urem",
    }
}

fn cmp_str(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "eq",
        CmpOp::Ne => "ne",
        CmpOp::Ult => "ult",
        CmpOp::Ule => "ule",
        CmpOp::Ugt => "ugt",
        CmpOp::Uge => "uge",
        CmpOp::Slt => "slt",
        CmpOp::Sle => "sle",
        CmpOp::Sgt => "sgt",
        CmpOp::Sge => "sge",
    }
}

fn callee_str(func: &Function, callee: &Callee) -> String {
    match callee {
        Callee::Direct(name) => format!("@{name}"),
        Callee::Indirect(op) => operand_str(func, op),
    }
}

fn print_inst(func: &Function, inst: &Inst) -> String {
    match inst {
        Inst::Alloca { dest, ty, align } => format!(
            "{} = alloca {}, align {}",
            value_str(func, *dest),
            print_ty(ty),
            align
        ),
        Inst::Load { dest, ty, ptr } => format!(
            "{} = load {}, {}",
            value_str(func, *dest),
            print_ty(ty),
            operand_str(func, ptr)
        ),
        Inst::Store { val, ptr } => format!(
            "store {}, {}",
            operand_str(func, val),
            operand_str(func, ptr)
        ),
        Inst::Bin {
            dest,
            op,
            bits,
            lhs,
            rhs,
        } => format!(
            "{} = {} i{} {}, {}",
            value_str(func, *dest),
            bin_str(*op),
            bits,
            operand_str(func, lhs),
            operand_str(func, rhs)
        ),
        Inst::Icmp {
            dest,
            op,
            bits,
            lhs,
            rhs,
        } => format!(
            "{} = icmp {} i{} {}, {}",
            value_str(func, *dest),
            cmp_str(*op),
            bits,
            operand_str(func, lhs),
            operand_str(func, rhs)
        ),
        Inst::Select {
            dest,
            cond,
            on_true,
            on_false,
            ..
        } => format!(
            "{} = select {}, {}, {}",
            value_str(func, *dest),
            operand_str(func, cond),
            operand_str(func, on_true),
            operand_str(func, on_false)
        ),
        Inst::Phi { dest, incoming, .. } => {
            let edges: Vec<String> = incoming
                .iter()
                .map(|(op, pred)| format!("[ {}, %{} ]", operand_str(func, op), pred))
                .collect();
            format!("{} = phi {}", value_str(func, *dest), edges.join(", "))
        }
        Inst::Gep {
            dest,
            elem_ty,
            base,
            indices,
            inbounds,
        } => {
            let indices: Vec<String> = indices.iter().map(|i| operand_str(func, i)).collect();
            format!(
                "{} = getelementptr{} {}, {}, {}",
                value_str(func, *dest),
                if *inbounds { " inbounds" } else { "" },
                print_ty(elem_ty),
                operand_str(func, base),
                indices.join(", ")
            )
        }
        Inst::Cast { dest, to, val } => format!(
            "{} = bitcast {} to {}",
            value_str(func, *dest),
            operand_str(func, val),
            print_ty(to)
        ),
        Inst::Call {
            dest,
            callee,
            args,
            ret_ty,
            tail,
            ..
        } => {
            let args: Vec<String> = args.iter().map(|a| operand_str(func, a)).collect();
            let prefix = match dest {
                Some(v) => format!("{} = ", value_str(func, *v)),
                None => String::new(),
            };
            format!(
                "{}{}call {} {}({})",
                prefix,
                if *tail { "tail " } else { "" },
                print_ty(ret_ty),
                callee_str(func, callee),
                args.join(", ")
            )
        }
    }
}

fn print_term(func: &Function, term: &Term) -> String {
    match term {
        Term::Ret(None) => "ret void".into(),
        Term::Ret(Some(op)) => format!("ret {}", operand_str(func, op)),
        Term::Br { dest } => format!("br label %{dest}"),
        Term::CondBr {
            cond,
            on_true,
            on_false,
        } => format!(
            "br {}, label %{}, label %{}",
            operand_str(func, cond),
            on_true,
            on_false
        ),
        Term::IndirectBr { addr, dests } => {
            let dests: Vec<String> = dests.iter().map(|d| format!("label %{d}")).collect();
            format!(
                "indirectbr {}, [{}]",
                operand_str(func, addr),
                dests.join(", ")
            )
        }
        Term::Invoke {
            dest,
            callee,
            args,
            normal,
            unwind,
            ..
        } => {
            let args: Vec<String> = args.iter().map(|a| operand_str(func, a)).collect();
            let prefix = match dest {
                Some(v) => format!("{} = ", value_str(func, *v)),
                None => String::new(),
            };
            format!(
                "{}invoke {}({}) to label %{} unwind label %{}",
                prefix,
                callee_str(func, callee),
                args.join(", "),
                normal,
                unwind
            )
        }
        Term::Unreachable => "unreachable".into(),
    }
}
