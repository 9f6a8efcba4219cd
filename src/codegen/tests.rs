use super::{helpers, lower, rewrite, Asm, Codegen, LabelSeq};
use crate::error::CodegenError;
use crate::node::{Node, NodeArena, NodeFlags, NodeId, Op};
use crate::symtab::NameTable;
use crate::target::m6809::M6809;
use crate::target::FuncState;
use crate::types::{Base, ProtoId, RecId, Ty};

struct Rig {
    arena: NodeArena,
    asm: Asm,
    state: FuncState,
    names: NameTable,
    labels: LabelSeq,
}

impl Rig {
    fn new() -> Rig {
        let mut names = NameTable::new();
        names.insert(1, "f");
        names.insert(2, "g");
        names.insert(3, "h");
        Rig {
            arena: NodeArena::with_capacity(32),
            asm: Asm::new(),
            state: FuncState::new(),
            names,
            labels: LabelSeq::new(),
        }
    }

    fn leaf(&mut self, op: Op, ty: Ty, value: u32) -> NodeId {
        let id = self.arena.acquire().unwrap();
        *self.arena.node_mut(id) = Node {
            op,
            ty,
            value,
            ..Node::blank()
        };
        id
    }

    fn pair(&mut self, op: Op, ty: Ty, left: NodeId, right: NodeId) -> NodeId {
        let id = self.arena.acquire().unwrap();
        *self.arena.node_mut(id) = Node {
            op,
            ty,
            left: Some(left),
            right: Some(right),
            ..Node::blank()
        };
        id
    }

    fn unary(&mut self, op: Op, ty: Ty, right: NodeId) -> NodeId {
        let id = self.arena.acquire().unwrap();
        *self.arena.node_mut(id) = Node {
            op,
            ty,
            right: Some(right),
            ..Node::blank()
        };
        id
    }

    fn lower(&mut self, root: NodeId) {
        let mut be = M6809::new();
        let mut cg = Codegen {
            arena: &mut self.arena,
            asm: &mut self.asm,
            state: &mut self.state,
            names: &mut self.names,
            labels: &mut self.labels,
        };
        lower(&mut be, &mut cg, root).unwrap();
    }

    fn lines(&self) -> Vec<&str> {
        self.asm.lines().collect()
    }
}

#[test]
fn test_suffix_table() {
    assert_eq!(helpers::type_suffix(Ty::ULONG).unwrap(), "ul");
    assert_eq!(helpers::type_suffix(Ty::INT).unwrap(), "");
    assert_eq!(helpers::type_suffix(Ty::UCHAR).unwrap(), "uc");
    assert_eq!(helpers::type_suffix(Ty::INT.ptr_to()).unwrap(), "");
    assert_eq!(helpers::helper_suffix(Ty::ULONG).unwrap(), "l");
    assert_eq!(helpers::helper_suffix(Ty::UINT).unwrap(), "");
    assert!(matches!(
        helpers::type_suffix(Ty::of(Base::LongLong)),
        Err(CodegenError::HelperType { .. })
    ));
}

#[test]
fn test_direct_constant_add() {
    let mut rig = Rig::new();
    let l = rig.leaf(Op::Constant, Ty::INT, 5);
    let r = rig.leaf(Op::Constant, Ty::INT, 3);
    let plus = rig.pair(Op::Plus, Ty::INT, l, r);
    rig.lower(plus);
    assert_eq!(rig.lines(), vec!["\tldd #5", "\taddd #3"]);
    assert_eq!(rig.state.sp, 0);
}

#[test]
fn test_wide_add_spills_and_calls_helper() {
    let mut rig = Rig::new();
    let l = rig.leaf(Op::Constant, Ty::LONG, 3);
    let r = rig.leaf(Op::Constant, Ty::LONG, 4);
    let plus = rig.pair(Op::Plus, Ty::LONG, l, r);
    rig.lower(plus);
    assert_eq!(
        rig.lines(),
        vec![
            "\tldu #0",
            "\tldd #3",
            "\tpshs d,u",
            "\tldu #0",
            "\tldd #4",
            "\tjsr __plusl",
        ]
    );
    assert_eq!(rig.state.sp, 0);
}

#[test]
fn test_wide_bitwise_or_declines_constant_shortcut() {
    // The or shortcut is word-sized only; four-byte operands go
    // through the helper even with a constant right side.
    let mut rig = Rig::new();
    let l = rig.leaf(Op::Constant, Ty::LONG, 3);
    let r = rig.leaf(Op::Constant, Ty::LONG, 4);
    let or = rig.pair(Op::Or, Ty::LONG, l, r);
    rig.lower(or);
    assert_eq!(
        rig.lines(),
        vec![
            "\tldu #0",
            "\tldd #3",
            "\tpshs d,u",
            "\tldu #0",
            "\tldd #4",
            "\tjsr __orl",
        ]
    );
    assert_eq!(rig.state.sp, 0);
}

#[test]
fn test_division_keeps_sign_in_helper_name() {
    let mut rig = Rig::new();
    let l = rig.leaf(Op::Constant, Ty::UINT, 10);
    let r = rig.leaf(Op::Constant, Ty::UINT, 2);
    let div = rig.pair(Op::Slash, Ty::UINT, l, r);
    rig.lower(div);
    assert_eq!(rig.lines().last(), Some(&"\tjsr __divu"));

    let mut rig = Rig::new();
    let l = rig.leaf(Op::Constant, Ty::INT, 10);
    let r = rig.leaf(Op::Constant, Ty::INT, 2);
    let div = rig.pair(Op::Slash, Ty::INT, l, r);
    rig.lower(div);
    assert_eq!(rig.lines().last(), Some(&"\tjsr __div"));
}

#[test]
fn test_helper_push_fallback_for_eight_byte_operands() {
    let mut rig = Rig::new();
    let gl = rig.leaf(Op::Name, Ty::DOUBLE.ptr_to(), 0);
    rig.arena.node_mut(gl).sym = 2;
    let l = rig.unary(Op::Deref, Ty::DOUBLE, gl);
    let gr = rig.leaf(Op::Name, Ty::DOUBLE.ptr_to(), 0);
    rig.arena.node_mut(gr).sym = 3;
    let r = rig.unary(Op::Deref, Ty::DOUBLE, gr);
    let plus = rig.pair(Op::Plus, Ty::DOUBLE, l, r);
    rig.lower(plus);
    assert_eq!(
        rig.lines(),
        vec![
            "\tldd #_g+0",
            "\tjsr __derefd",
            "\tjsr __pushd",
            "\tldd #_h+0",
            "\tjsr __derefd",
            "\tjsr __plusd",
        ]
    );
    assert_eq!(rig.state.sp, 0);
}

#[test]
fn test_short_circuit_or_branches_around_right() {
    let mut rig = Rig::new();
    let c1 = rig.leaf(Op::Constant, Ty::INT, 1);
    let b1 = rig.unary(Op::Bool, Ty::INT, c1);
    let c0 = rig.leaf(Op::Constant, Ty::INT, 0);
    let b0 = rig.unary(Op::Bool, Ty::INT, c0);
    let oror = rig.pair(Op::OrOr, Ty::INT, b1, b0);
    rig.lower(oror);
    assert_eq!(
        rig.lines(),
        vec![
            "\tldd #1",
            "\tjsr __bool",
            "\tcmpd #0",
            "\tlbne L0L",
            "\tldd #0",
            "\tjsr __bool",
            "L0L:",
        ]
    );
}

#[test]
fn test_ternary_diamond() {
    let mut rig = Rig::new();
    let cond = rig.leaf(Op::Constant, Ty::INT, 1);
    let bool_cond = rig.unary(Op::Bool, Ty::INT, cond);
    let a = rig.leaf(Op::Constant, Ty::INT, 5);
    let b = rig.leaf(Op::Constant, Ty::INT, 9);
    let colon = rig.pair(Op::Colon, Ty::INT, a, b);
    let question = rig.pair(Op::Question, Ty::INT, bool_cond, colon);
    rig.lower(question);
    assert_eq!(
        rig.lines(),
        vec![
            "\tldd #1",
            "\tjsr __bool",
            "\tcmpd #0",
            "\tlbeq L0L",
            "\tldd #5",
            "\tjmp L0LC",
            "L0L:",
            "\tldd #9",
            "L0LC:",
        ]
    );
}

#[test]
fn test_comma_evaluates_both_sides_without_stacking() {
    let mut rig = Rig::new();
    let l = rig.leaf(Op::Constant, Ty::INT, 3);
    let r = rig.leaf(Op::Constant, Ty::INT, 4);
    let comma = rig.pair(Op::Comma, Ty::INT, l, r);
    rig.lower(comma);
    assert_eq!(rig.lines(), vec!["\tldd #3", "\tldd #4"]);
    assert_eq!(rig.state.sp, 0);
}

#[test]
fn test_call_argument_stays_stacked_until_cleanup() {
    let mut rig = Rig::new();
    let arg = rig.leaf(Op::Constant, Ty::INT, 7);
    let call = rig.arena.acquire().unwrap();
    *rig.arena.node_mut(call) = Node {
        op: Op::CallName,
        ty: Ty::INT,
        sym: 1,
        left: Some(arg),
        ..Node::blank()
    };
    let size = rig.leaf(Op::Constant, Ty::UINT, 2);
    let cleanup = rig.pair(Op::Cleanup, Ty::UINT, call, size);
    rig.lower(cleanup);
    assert_eq!(
        rig.lines(),
        vec!["\tldd #7", "\tpshs d", "\tjsr _f+0", "\tleas 2,s"]
    );
    assert_eq!(rig.state.sp, 0);
}

#[test]
fn test_unreachable_suppresses_everything() {
    let mut rig = Rig::new();
    rig.state.unreachable = true;
    let c = rig.leaf(Op::Constant, Ty::INT, 42);
    rig.lower(c);
    assert!(rig.asm.is_empty());
}

#[test]
fn test_discarded_increment_shortcuts_to_read_modify_write() {
    let mut rig = Rig::new();
    let local = rig.leaf(Op::Local, Ty::INT.ptr_to(), 4);
    let step = rig.leaf(Op::Constant, Ty::INT, 1);
    let inc = rig.pair(Op::PlusPlus, Ty::INT, local, step);
    rig.arena.node_mut(inc).flags.insert(NodeFlags::NORETURN);
    rig.lower(inc);
    assert_eq!(rig.lines(), vec!["\tldd 4,s", "\taddd #1", "\tstd 4,s"]);
}

#[test]
fn test_consumed_increment_calls_postinc_helper() {
    let mut rig = Rig::new();
    let local = rig.leaf(Op::Local, Ty::INT.ptr_to(), 4);
    let step = rig.leaf(Op::Constant, Ty::INT, 1);
    let inc = rig.pair(Op::PlusPlus, Ty::INT, local, step);
    rig.lower(inc);
    assert_eq!(
        rig.lines(),
        vec![
            "\tleax 4,s",
            "\ttfr x,d",
            "\tpshs d",
            "\tldd #1",
            "\tjsr __postinc",
        ]
    );
}

#[test]
fn test_cast_helper_names_both_types() {
    let mut rig = Rig::new();
    let c = rig.leaf(Op::Constant, Ty::INT, 3);
    let cast = rig.unary(Op::Cast, Ty::LONG, c);
    rig.lower(cast);
    assert_eq!(rig.lines(), vec!["\tldd #3", "\tjsr __cast_l"]);

    let mut rig = Rig::new();
    let c = rig.leaf(Op::Constant, Ty::ULONG, 9);
    let cast = rig.unary(Op::Cast, Ty::UINT, c);
    rig.lower(cast);
    assert_eq!(rig.lines().last(), Some(&"\tjsr __castul_u"));
}

#[test]
fn test_comparison_result_elides_bool_wrap() {
    let mut rig = Rig::new();
    let l = rig.leaf(Op::Constant, Ty::INT, 1);
    let r = rig.leaf(Op::Constant, Ty::INT, 2);
    let eq = rig.pair(Op::EqEq, Ty::INT, l, r);
    let wrap = rig.unary(Op::Bool, Ty::INT, eq);
    rig.lower(wrap);
    assert_eq!(rig.lines().last(), Some(&"\tjsr __cceq"));
    assert!(!rig.lines().iter().any(|l| l.contains("__bool")));
    assert!(rig
        .arena
        .node(wrap)
        .flags
        .contains(NodeFlags::ISBOOL));
}

#[test]
fn test_rewrite_folds_lvalue_to_pointer() {
    let mut rig = Rig::new();
    let local = rig.leaf(Op::Local, Ty::INT, 4);
    rig.arena.node_mut(local).flags.insert(NodeFlags::LVAL);
    let be = M6809::new();
    let out = rewrite(&be, &rig.state, &mut rig.arena, local).unwrap();
    let n = rig.arena.node(out);
    assert_eq!(n.ty, Ty::INT.ptr_to());
    assert!(!n.flags.contains(NodeFlags::LVAL));
}

#[test]
fn test_rewrite_decays_function_values() {
    let mut rig = Rig::new();
    let name = rig.leaf(Op::Name, Ty::of(Base::Func(ProtoId(0))), 0);
    let be = M6809::new();
    let out = rewrite(&be, &rig.state, &mut rig.arena, name).unwrap();
    assert!(rig.arena.node(out).ty.is_func_ptr());
}

#[test]
fn test_rewrite_rejects_bare_aggregates() {
    let mut rig = Rig::new();
    let name = rig.leaf(Op::Name, Ty::of(Base::Record(RecId(0))), 0);
    let be = M6809::new();
    assert!(matches!(
        rewrite(&be, &rig.state, &mut rig.arena, name),
        Err(CodegenError::BadNodeType { .. })
    ));
}

#[test]
fn test_rewrite_then_lower_uses_addressing_form() {
    let mut rig = Rig::new();
    let local = rig.leaf(Op::Local, Ty::INT.ptr_to(), 6);
    let deref = rig.unary(Op::Deref, Ty::INT, local);
    let be = M6809::new();
    let root = rewrite(&be, &rig.state, &mut rig.arena, deref).unwrap();
    rig.lower(root);
    assert_eq!(rig.lines(), vec!["\tldd 6,s"]);
}

#[test]
fn test_register_read_modify_write() {
    // r = r + 1 with r in the register storage class: both sides
    // collapse to transfers, never touching memory.
    let mut rig = Rig::new();
    let r_read = rig.leaf(Op::Reg, Ty::INT, 0);
    rig.arena.node_mut(r_read).flags.insert(NodeFlags::LVAL);
    let read = rig.unary(Op::Deref, Ty::INT, r_read);
    let one = rig.leaf(Op::Constant, Ty::INT, 1);
    let plus = rig.pair(Op::Plus, Ty::INT, read, one);
    let r_write = rig.leaf(Op::Reg, Ty::INT, 0);
    rig.arena.node_mut(r_write).flags.insert(NodeFlags::LVAL);
    let eq = rig.pair(Op::Eq, Ty::INT, r_write, plus);
    let be = M6809::new();
    let root = rewrite(&be, &rig.state, &mut rig.arena, eq).unwrap();
    rig.lower(root);
    assert_eq!(rig.lines(), vec!["\ttfr y,d", "\taddd #1", "\ttfr d,y"]);
}

#[test]
fn test_nested_conditionals_number_labels_apart() {
    // (a ? b : c) inside (x ? y : z) must not share label ids.
    let mut rig = Rig::new();
    let inner_a = rig.leaf(Op::Constant, Ty::INT, 1);
    let inner_b = rig.leaf(Op::Constant, Ty::INT, 2);
    let inner_colon = rig.pair(Op::Colon, Ty::INT, inner_a, inner_b);
    let inner_cond = rig.leaf(Op::Constant, Ty::INT, 1);
    let inner_bool = rig.unary(Op::Bool, Ty::INT, inner_cond);
    let inner = rig.pair(Op::Question, Ty::INT, inner_bool, inner_colon);

    let outer_b = rig.leaf(Op::Constant, Ty::INT, 3);
    let outer_colon = rig.pair(Op::Colon, Ty::INT, inner, outer_b);
    let outer_cond = rig.leaf(Op::Constant, Ty::INT, 0);
    let outer_bool = rig.unary(Op::Bool, Ty::INT, outer_cond);
    let outer = rig.pair(Op::Question, Ty::INT, outer_bool, outer_colon);
    rig.lower(outer);

    let text = rig.asm.text();
    assert!(text.contains("L0L:"), "{text}");
    assert!(text.contains("L1L:"), "{text}");
    assert!(text.contains("L0LC:"), "{text}");
    assert!(text.contains("L1LC:"), "{text}");
}
