use std::io::Cursor;

use ccback::diagnostic::DiagnosticSink;
use ccback::driver::Driver;
use ccback::expr::{Builder, Punct, Storage, Token, TokenBuffer};
use ccback::node::{NodeArena, DEFAULT_NODE_CAPACITY};
use ccback::record::{HeaderKind, RecordWriter};
use ccback::symtab::NameTable;
use ccback::target::for_cpu;
use ccback::types::{ArgTail, Base, Prototype, Ty, TypeStore};

fn p(p: Punct) -> Token {
    Token::Punct(p)
}

fn num(value: u32) -> Token {
    Token::IntConst { value, ty: Ty::INT }
}

fn local(id: u16, ty: Ty, offset: u32) -> Token {
    Token::Symbol {
        id,
        ty,
        storage: Storage::Local { offset },
    }
}

/// Helper: build one statement's tree from resolved tokens and append it
/// to the stream as an expression record, the way the front half hands
/// statements over. The tree is released once written.
fn statement(
    w: &mut RecordWriter<Vec<u8>>,
    types: &TypeStore,
    tokens: Vec<Token>,
    mkbool: bool,
    noret: bool,
) {
    let be = for_cpu(6809).unwrap();
    let mut arena = NodeArena::with_capacity(DEFAULT_NODE_CAPACITY);
    let mut diags = DiagnosticSink::new();
    let root = {
        let mut b = Builder::new(
            TokenBuffer::of(tokens),
            &mut arena,
            types,
            be.as_ref(),
            &mut diags,
        );
        b.expression(true, mkbool, noret).unwrap().unwrap()
    };
    assert!(!diags.has_errors());
    w.expr_tree(&arena, root).unwrap();
    arena.release_tree(root);
    assert_eq!(arena.live(), 0);
}

fn drive(stream: Vec<u8>, names: &[(u16, &str)]) -> String {
    let mut table = NameTable::new();
    for &(id, n) in names {
        table.insert(id, n);
    }
    let mut driver = Driver::new(
        Cursor::new(stream),
        Vec::new(),
        for_cpu(6809).unwrap(),
        Box::new(table),
    );
    driver.run().unwrap();
    String::from_utf8(driver.into_output()).unwrap()
}

// ── Whole functions ──

#[test]
fn test_function_pipeline() {
    let types = TypeStore::new();
    let mut w = RecordWriter::new(Vec::new());
    w.header(HeaderKind::Export, 1, 0).unwrap();
    w.header(HeaderKind::Function, 9, 1).unwrap();
    w.header(HeaderKind::Frame, 2, 0).unwrap();
    statement(
        &mut w,
        &types,
        vec![local(2, Ty::INT, 0), p(Punct::Eq), num(3), p(Punct::Plus), num(4)],
        false,
        true,
    );
    w.header(HeaderKind::Return, 0, 0).unwrap();
    statement(&mut w, &types, vec![local(2, Ty::INT, 0)], false, false);
    w.footer(HeaderKind::Return, 0, 0).unwrap();
    w.footer(HeaderKind::Function, 9, 0).unwrap();
    let text = drive(w.into_inner(), &[(1, "calc")]);
    insta::assert_snapshot!("function_pipeline", text);
}

#[test]
fn test_while_loop_pipeline() {
    let types = TypeStore::new();
    let mut w = RecordWriter::new(Vec::new());
    w.header(HeaderKind::Function, 7, 1).unwrap();
    w.header(HeaderKind::Frame, 2, 0).unwrap();
    w.header(HeaderKind::While, 0, 3).unwrap();
    statement(&mut w, &types, vec![local(2, Ty::INT, 0)], true, false);
    statement(
        &mut w,
        &types,
        vec![local(2, Ty::INT, 0), p(Punct::MinusMinus)],
        false,
        true,
    );
    w.footer(HeaderKind::While, 0, 3).unwrap();
    w.footer(HeaderKind::Function, 7, 0).unwrap();
    let text = drive(w.into_inner(), &[(1, "spin")]);

    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "\t.code",
            "\t.code",
            "_spin:",
            "\tleas -2,s",
            "L3_cond:",
            "\tldd 0,s",
            "\tjsr __bool",
            ";",
            "\tcmpd #0",
            "\tlbeq L3_break",
            "\tldd 0,s",
            "\tsubd #1",
            "\tstd 0,s",
            ";",
            "\tjmp L3_cond",
            "L3_break:",
            "\tleas 2,s",
            "\trts",
        ]
    );
}

// ── Single statements ──

#[test]
fn test_subscript_store_pipeline() {
    let types = TypeStore::new();
    let mut w = RecordWriter::new(Vec::new());
    w.header(HeaderKind::Function, 5, 1).unwrap();
    w.header(HeaderKind::Frame, 2, 0).unwrap();
    statement(
        &mut w,
        &types,
        vec![
            local(2, Ty::INT.ptr_to(), 0),
            p(Punct::LSquare),
            num(2),
            p(Punct::RSquare),
            p(Punct::Eq),
            num(5),
        ],
        false,
        true,
    );
    w.footer(HeaderKind::Function, 5, 0).unwrap();
    let text = drive(w.into_inner(), &[(1, "put")]);
    assert!(
        text.contains("\tldd 0,s\n\taddd #4\n\ttfr d,x\n\tldd #5\n\tstd ,x\n;\n"),
        "{text}"
    );
}

#[test]
fn test_store_through_pointer_pipeline() {
    let types = TypeStore::new();
    let mut w = RecordWriter::new(Vec::new());
    w.header(HeaderKind::Function, 6, 1).unwrap();
    w.header(HeaderKind::Frame, 4, 0).unwrap();
    statement(
        &mut w,
        &types,
        vec![
            p(Punct::Star),
            local(2, Ty::INT.ptr_to(), 0),
            p(Punct::Eq),
            local(3, Ty::INT, 2),
        ],
        false,
        true,
    );
    w.footer(HeaderKind::Function, 6, 0).unwrap();
    let text = drive(w.into_inner(), &[(1, "poke")]);
    // The pushed address moves the stack pointer, so the right-hand
    // local reads through an adjusted offset.
    assert!(
        text.contains("\tldd 0,s\n\tpshs d\n\tldd 4,s\n\tpuls x\n\tstd ,x\n;\n"),
        "{text}"
    );
}

#[test]
fn test_call_pipeline() {
    let mut types = TypeStore::new();
    let proto = types.add_proto(Prototype {
        ret: Ty::VOID,
        params: vec![Ty::INT, Ty::INT],
        tail: ArgTail::Fixed,
    });
    let g = Token::Symbol {
        id: 2,
        ty: Ty::of(Base::Func(proto)),
        storage: Storage::Static,
    };
    let mut w = RecordWriter::new(Vec::new());
    w.header(HeaderKind::Function, 4, 1).unwrap();
    w.header(HeaderKind::Frame, 0, 0).unwrap();
    statement(
        &mut w,
        &types,
        vec![
            g,
            p(Punct::LParen),
            num(1),
            p(Punct::Comma),
            num(2),
            p(Punct::RParen),
        ],
        false,
        true,
    );
    w.footer(HeaderKind::Function, 4, 0).unwrap();
    let text = drive(w.into_inner(), &[(1, "caller"), (2, "g")]);
    // Arguments push right to left; the cleanup record's byte count
    // pops both at once after the call returns.
    assert!(
        text.contains("\tldd #2\n\tpshs d\n\tldd #1\n\tpshs d\n\tjsr _g+0\n\tleas 4,s\n;\n"),
        "{text}"
    );
}

// ── Arena discipline ──

#[test]
fn test_statement_trees_release_per_statement() {
    let types = TypeStore::new();
    let mut w = RecordWriter::new(Vec::new());
    w.header(HeaderKind::Function, 3, 1).unwrap();
    w.header(HeaderKind::Frame, 2, 0).unwrap();
    // Five nodes a statement, forty statements: far past the arena's
    // capacity unless every tree is released when its statement ends.
    for _ in 0..40 {
        statement(
            &mut w,
            &types,
            vec![
                local(2, Ty::INT, 0),
                p(Punct::Eq),
                local(2, Ty::INT, 0),
                p(Punct::Plus),
                num(1),
            ],
            false,
            true,
        );
    }
    w.footer(HeaderKind::Function, 3, 0).unwrap();
    let text = drive(w.into_inner(), &[(1, "bump")]);
    assert_eq!(text.matches("\tstd 0,s").count(), 40);
}
