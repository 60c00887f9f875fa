use crate::database::{Database, DbError};
use crate::line_cache::LineIndex;
use crate::scanner::{ScanContext, ScanStep, Scanner};
use crate::source::{is_mm_space, is_token_char, DeferredResolver, FsResolver, MemoryResolver};
use crate::statement::StatementType;
use crate::util::as_str;
use assert_matches::assert_matches;

const TEXT: &[u8] = b"$c a $.\n\n  $c b $.\n";

fn root_source(text: &[u8]) -> Database {
    let mut db = Database::default();
    db.parse_with("a.mm", vec![("a.mm".to_owned(), text.to_owned())])
        .unwrap();
    db
}

#[test]
fn test_whitespace_classes() {
    for byte in [b' ', b'\t', b'\n', b'\r', 0x0c] {
        assert!(is_mm_space(byte));
        assert!(!is_token_char(byte));
    }
    for byte in [0u8, 0x0b, 0x7f, 0x80, 0xff] {
        assert!(!is_mm_space(byte));
        assert!(!is_token_char(byte));
    }
    for byte in [b'!', b'$', b'a', b'~'] {
        assert!(!is_mm_space(byte));
        assert!(is_token_char(byte));
    }
}

#[test]
fn test_lookup_pos() {
    let db = root_source(TEXT);
    let source = &db.sources()[0];
    assert_eq!(source.name(), "a.mm");
    assert_eq!(source.lookup_pos(0), (1, 1));
    assert_eq!(source.lookup_pos(7), (1, 8));
    assert_eq!(source.lookup_pos(8), (2, 1));
    assert_eq!(source.lookup_pos(11), (3, 3));
    assert_eq!(source.lookup_pos(TEXT.len()), (4, 1));
}

#[test]
fn test_get_line() {
    let db = root_source(TEXT);
    let source = &db.sources()[0];
    assert_eq!(source.get_line(1), b"$c a $.\n");
    assert_eq!(source.get_line(2), b"\n");
    assert_eq!(source.get_line(3), b"  $c b $.\n");
    assert_eq!(source.get_line(4), b"");
    assert_eq!(source.get_line(0), b"");
    assert_eq!(source.get_line(9), b"");
}

#[test]
fn test_token_end() {
    let db = root_source(TEXT);
    let source = &db.sources()[0];
    assert_eq!(source.token_end(0), 2);
    assert_eq!(source.token_end(16), 18);
    let db = root_source(b"$c tail");
    assert_eq!(db.sources()[0].token_end(3), 7);
}

#[test]
fn test_line_index_chunks() {
    let text: Vec<u8> = b"x\n".repeat(5000);
    let index = LineIndex::new(&text);
    assert_eq!(index.line_count(), 5001);
    assert_eq!(index.from_offset(0), (1, 1));
    assert_eq!(index.from_offset(2 * 1024), (1025, 1));
    assert_eq!(index.from_offset(2 * 4321 + 1), (4322, 2));
    assert_eq!(index.line_range(1025), Some(2048..2050));
    assert_eq!(index.line_range(5001), Some(10000..10000));
    assert_eq!(index.line_range(5002), None);
    assert_eq!(LineIndex::line_end(&text, 3), 3);
    assert_eq!(LineIndex::line_end(b"abc", 1), 3);
}

#[test]
fn test_missing_root() {
    let mut db = Database::default();
    db.parse_with("absent.mm", vec![]).unwrap();
    assert_eq!(db.statements().len(), 1);
    assert_eq!(db.statement(0).statement_type(), StatementType::Eof);
    let diags = db.scan_diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].1.code(), "source-failed");
    assert_eq!(diags[0].1.arg("reason").unwrap().to_string(), "no source named absent.mm");
    assert_eq!(db.sources()[0].failure(), Some("no source named absent.mm"));
}

#[test]
fn test_fs_resolver_failure() {
    let mut db = Database::default();
    db.parse(
        "does-not-exist.mm",
        Box::new(FsResolver::new("/nonexistent-directory")),
    )
    .unwrap();
    assert_eq!(db.scan_diagnostics()[0].1.code(), "source-failed");
}

#[test]
fn test_pending_source() {
    let mut db = Database::default();
    assert_eq!(
        db.parse("root.mm", Box::new(DeferredResolver)),
        Err(DbError::SourcePending("root.mm".to_owned()))
    );
}

#[test]
fn test_resumed_scan() {
    let mut ctx = ScanContext::new(Box::new(DeferredResolver));
    let mut scanner = Scanner::new("root.mm", false);
    assert_matches!(scanner.next_statement(&mut ctx), ScanStep::Pending(name) if name == "root.mm");
    ctx.provide("root.mm", Ok(b"$c x $. $[ lib.mm $] $c z $.".to_vec()));
    let mut statements = Vec::new();
    loop {
        match scanner.next_statement(&mut ctx) {
            ScanStep::Statement(stmt) => statements.push(stmt),
            ScanStep::Pending(name) => {
                assert_eq!(name, "lib.mm");
                ctx.provide("lib.mm", Ok(b" $c y $.".to_vec()));
            }
            ScanStep::Done => break,
        }
    }
    let db = Database::from_scan(Default::default(), ctx, statements);
    let symbols: Vec<&str> = db
        .statements()
        .iter()
        .flat_map(|stmt| stmt.math().iter().map(|t| as_str(t)))
        .collect();
    assert_eq!(symbols, ["x", "y", "z"]);
    assert_eq!(db.statement(1).statement_type(), StatementType::Include);
    assert_eq!(as_str(&db.text()), "$c x $. $[ lib.mm $] $c y $. $c z $.");
}

#[test]
fn test_memory_resolver_first_answer() {
    let mut ctx = ScanContext::new(Box::new(MemoryResolver::new(vec![(
        "a.mm".to_owned(),
        b"$c a $.".to_vec(),
    )])));
    let mut scanner = Scanner::new("a.mm", false);
    assert_matches!(scanner.next_statement(&mut ctx), ScanStep::Statement(_));
    ctx.provide("a.mm", Ok(b"ignored".to_vec()));
    assert_eq!(ctx.source(ctx.lookup("a.mm").unwrap()).text(), b"$c a $.");
}
