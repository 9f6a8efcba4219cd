//! Throughput benchmarks for the record pipeline.
//!
//! Measures the stages separately and combined:
//! 1. Expression tree construction from resolved tokens
//! 2. Record stream decode back into node trees
//! 3. Full translation: record stream in, assembly text out

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use std::io::Cursor;

use ccback::diagnostic::DiagnosticSink;
use ccback::driver::Driver;
use ccback::expr::{Builder, Punct, Storage, Token, TokenBuffer};
use ccback::node::{NodeArena, NodeId, DEFAULT_NODE_CAPACITY};
use ccback::record::{HeaderKind, RecordReader, RecordWriter};
use ccback::symtab::NameTable;
use ccback::target::for_cpu;
use ccback::types::{ArgTail, Base, Prototype, Ty, TypeStore};

fn build_statement(types: &TypeStore, arena: &mut NodeArena, tokens: Vec<Token>) -> NodeId {
    let be = for_cpu(6809).unwrap();
    let mut diags = DiagnosticSink::new();
    let mut b = Builder::new(TokenBuffer::of(tokens), arena, types, be.as_ref(), &mut diags);
    b.expression(true, false, true).unwrap().unwrap()
}

fn increment_tokens() -> Vec<Token> {
    let x = Token::Symbol {
        id: 3,
        ty: Ty::INT,
        storage: Storage::Local { offset: 0 },
    };
    let one = Token::IntConst { value: 1, ty: Ty::INT };
    vec![x, Token::Punct(Punct::Eq), x, Token::Punct(Punct::Plus), one]
}

/// Build a one-function record stream of `n` statements cycling through
/// a few representative shapes.
fn synthetic_stream(types: &TypeStore, f: Token, n: usize) -> Vec<u8> {
    let x = Token::Symbol {
        id: 3,
        ty: Ty::INT,
        storage: Storage::Local { offset: 0 },
    };
    let ptr = Token::Symbol {
        id: 4,
        ty: Ty::INT.ptr_to(),
        storage: Storage::Local { offset: 2 },
    };

    let mut w = RecordWriter::new(Vec::new());
    w.header(HeaderKind::Function, 1, 1).unwrap();
    w.header(HeaderKind::Frame, 4, 0).unwrap();
    let mut arena = NodeArena::with_capacity(DEFAULT_NODE_CAPACITY);
    for i in 0..n {
        let tokens = match i % 3 {
            0 => increment_tokens(),
            1 => vec![Token::Punct(Punct::Star), ptr, Token::Punct(Punct::Eq), x],
            _ => vec![f, Token::Punct(Punct::LParen), x, Token::Punct(Punct::RParen)],
        };
        let root = build_statement(types, &mut arena, tokens);
        w.expr_tree(&arena, root).unwrap();
        arena.release_tree(root);
    }
    w.footer(HeaderKind::Function, 1, 0).unwrap();
    w.into_inner()
}

fn names() -> NameTable {
    let mut t = NameTable::new();
    t.insert(1, "bench");
    t.insert(2, "f");
    t
}

/// Benchmark: resolved tokens to a finished statement tree.
fn bench_tree_build(c: &mut Criterion) {
    let types = TypeStore::new();
    let tokens = increment_tokens();
    let mut arena = NodeArena::with_capacity(DEFAULT_NODE_CAPACITY);
    c.bench_function("build_increment_statement", |b| {
        b.iter(|| {
            let root = build_statement(&types, &mut arena, black_box(tokens.clone()));
            arena.release_tree(root)
        })
    });
}

/// Benchmark: one expression record decoded back into the arena.
fn bench_decode(c: &mut Criterion) {
    let types = TypeStore::new();
    let mut arena = NodeArena::with_capacity(DEFAULT_NODE_CAPACITY);
    let root = build_statement(&types, &mut arena, increment_tokens());
    let mut w = RecordWriter::new(Vec::new());
    w.expr_tree(&arena, root).unwrap();
    arena.release_tree(root);
    let buf = w.into_inner();

    c.bench_function("decode_expression_record", |b| {
        b.iter(|| {
            let mut r = RecordReader::new(Cursor::new(black_box(&buf)));
            r.next_block().unwrap();
            let id = r.read_tree(&mut arena).unwrap();
            arena.release_tree(id)
        })
    });
}

/// Benchmark: full translation of a synthetic function.
fn bench_translate(c: &mut Criterion) {
    let mut types = TypeStore::new();
    let proto = types.add_proto(Prototype {
        ret: Ty::VOID,
        params: vec![Ty::INT],
        tail: ArgTail::Fixed,
    });
    let f = Token::Symbol {
        id: 2,
        ty: Ty::of(Base::Func(proto)),
        storage: Storage::Static,
    };
    let stream_50 = synthetic_stream(&types, f, 50);
    let stream_200 = synthetic_stream(&types, f, 200);

    let mut group = c.benchmark_group("translate");
    group.bench_function("50_stmts", |b| {
        b.iter(|| {
            let mut driver = Driver::new(
                Cursor::new(black_box(stream_50.clone())),
                Vec::new(),
                for_cpu(6809).unwrap(),
                Box::new(names()),
            );
            driver.run().unwrap();
            driver.into_output()
        })
    });
    group.bench_function("200_stmts", |b| {
        b.iter(|| {
            let mut driver = Driver::new(
                Cursor::new(black_box(stream_200.clone())),
                Vec::new(),
                for_cpu(6809).unwrap(),
                Box::new(names()),
            );
            driver.run().unwrap();
            driver.into_output()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_tree_build, bench_decode, bench_translate);
criterion_main!(benches);
