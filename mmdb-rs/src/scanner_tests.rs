use crate::database::{Database, DbOptions};
use crate::grammar_tests::{mkdb, mkdb_with};
use crate::statement::{StatementKind, StatementType};
use crate::util::as_str;
use assert_matches::assert_matches;

const SAMPLE: &[u8] = b"$( A header comment. $)
  $c |- wff ( ) -> $.
  $v ph ps $.
  wph $f wff ph $.
  wps $f wff ps $.
  ${
    $d ph ps $.
    h1 $e |- ph $.
    th1 $p |- ph $= h1 $.
  $}
  $( $j syntax 'wff'; $)
";

fn types(db: &Database) -> Vec<StatementType> {
    db.statements().iter().map(|stmt| stmt.statement_type()).collect()
}

fn scan_codes(db: &Database) -> Vec<(usize, &'static str)> {
    db.scan_diagnostics()
        .iter()
        .map(|(ix, diag)| (*ix, diag.code()))
        .collect()
}

#[test]
fn test_statement_types() {
    let db = mkdb(SAMPLE);
    use StatementType::*;
    assert_eq!(
        types(&db),
        [
            Comment,
            Constant,
            Variable,
            Floating,
            Floating,
            Open,
            Disjoint,
            Essential,
            Provable,
            Close,
            MetaComment,
            Eof
        ]
    );
    assert!(db.scan_diagnostics().is_empty());
    for (index, stmt) in db.statements().iter().enumerate() {
        assert_eq!(stmt.index(), index);
    }
}

#[test]
fn test_statement_payload() {
    let db = mkdb(SAMPLE);
    let th1 = db.statement_by_label(b"th1").unwrap();
    assert_matches!(th1.kind(), StatementKind::Provable { label, math, proof } => {
        assert_eq!(&**label, b"th1");
        assert_eq!(math.len(), 2);
        assert_eq!(&*proof[0], b"h1");
    });
    let vars: Vec<&str> = db.statement(2).math().iter().map(|t| as_str(t)).collect();
    assert_eq!(vars, ["ph", "ps"]);
    assert!(db.statement(5).label().is_none());
}

#[test]
fn test_text_round_trip() {
    let db = mkdb(SAMPLE);
    assert_eq!(db.text(), SAMPLE);
    let joined: Vec<u8> = (0..db.statements().len())
        .flat_map(|index| db.raw_text(index))
        .collect();
    assert_eq!(joined, SAMPLE);
    // leading whitespace belongs to the statement
    assert_eq!(as_str(&db.raw_text(1)), "\n  $c |- wff ( ) -> $.");
    assert_eq!(as_str(&db.raw_text(11)), "\n");
}

#[test]
fn test_round_trip_with_errors() {
    let text: &[u8] = b"$c a $. x y $v z $. $a q $. $( open";
    let db = mkdb(text);
    assert_eq!(db.text(), text);
}

#[test]
fn test_lazy_positions() {
    let eager = mkdb_with(
        DbOptions {
            lazy_positions: false,
            ..DbOptions::default()
        },
        SAMPLE,
    );
    let lazy = mkdb(SAMPLE);
    assert_eq!(eager.statements().len(), lazy.statements().len());
    for index in 0..lazy.statements().len() {
        assert!(lazy.statement(index).cached_positions().is_none());
        let recorded = eager.statement(index).cached_positions().unwrap();
        assert_eq!(lazy.positions(index), recorded, "statement {index}");
    }
    let th1 = lazy.statement_by_label(b"th1").unwrap().index();
    let positions = lazy.positions(th1);
    let th1_at = SAMPLE.windows(3).position(|w| w == b"th1").unwrap();
    assert_eq!(positions.start, th1_at);
    assert_eq!(positions.label, Some(th1_at));
    assert_eq!(positions.keyword, th1_at + 4);
    assert_eq!(positions.math, [th1_at + 7, th1_at + 10]);
    assert_eq!(positions.separator, Some(th1_at + 13));
    assert_eq!(positions.proof, [th1_at + 16]);
    assert_eq!(positions.end, th1_at + 21);
}

#[test]
fn test_pseudo_nested_comment() {
    let db = mkdb(b"$( foo $( bar $)");
    assert_eq!(types(&db), [StatementType::Comment, StatementType::Eof]);
    assert_eq!(scan_codes(&db), [(0, "pseudo-nested-comment")]);
    let diags = db.scan_diagnostics();
    assert!(!diags[0].1.is_error());
}

#[test]
fn test_pseudo_comment_end() {
    let db = mkdb(b"$( foo x$) $)");
    assert_eq!(scan_codes(&db), [(0, "pseudo-comment-end")]);
}

#[test]
fn test_unclosed_comment() {
    let db = mkdb(b"$c x $. $( never closed");
    assert_eq!(types(&db), [StatementType::Constant, StatementType::Comment, StatementType::Eof]);
    assert_eq!(scan_codes(&db), [(1, "unclosed-comment")]);
}

#[test]
fn test_embedded_comment() {
    let db = mkdb(b"$c x $( inside $) y $.");
    assert_eq!(db.statement(0).math().len(), 2);
    assert!(db.scan_diagnostics().is_empty());
}

#[test]
fn test_missing_label() {
    let db = mkdb(b"$c wff $. $a wff x $.");
    assert_eq!(types(&db), [StatementType::Constant, StatementType::Bogus, StatementType::Eof]);
    assert_matches!(
        db.statement(1).kind(),
        StatementKind::Bogus { intended: StatementType::Axiom, .. }
    );
    assert_eq!(db.statement(1).math().len(), 2);
    assert_eq!(scan_codes(&db), [(1, "missing-label")]);
}

#[test]
fn test_spurious_label() {
    let db = mkdb(b"lbl $c x $.");
    assert_eq!(types(&db), [StatementType::Constant, StatementType::Eof]);
    assert_eq!(scan_codes(&db), [(0, "spurious-label")]);
}

#[test]
fn test_label_errors() {
    let db = mkdb(b"a b $a x $. b@d $a y $. dangling");
    assert_eq!(
        scan_codes(&db),
        [(0, "duplicate-label"), (1, "bad-label"), (2, "dangling-label")]
    );
    assert_eq!(db.statement(0).label(), Some(&b"b"[..]));
}

#[test]
fn test_nonterminated_math() {
    let db = mkdb(b"$c a b $v x $.");
    assert_eq!(
        types(&db),
        [StatementType::Constant, StatementType::Variable, StatementType::Eof]
    );
    assert_eq!(db.statement(0).math().len(), 2);
    let diags = db.scan_diagnostics();
    assert_eq!(scan_codes(&db), [(0, "nonterminated-math")]);
    assert_eq!(diags[0].1.arg("at").unwrap().to_string(), "$v");
    assert!(diags[0].1.is_error());
    assert_eq!(db.text(), b"$c a b $v x $.");
}

#[test]
fn test_nonterminated_proof() {
    let db = mkdb(b"$c x $. p $p x $= a b");
    assert_eq!(scan_codes(&db), [(1, "nonterminated-proof")]);
    assert_eq!(db.statement(1).proof().len(), 2);
}

#[test]
fn test_empty_math() {
    let db = mkdb(b"$c $.");
    assert_eq!(scan_codes(&db), [(0, "empty-math")]);
}

#[test]
fn test_misplaced_separator() {
    let db = mkdb(b"$c x $. ax $a x $= y $.");
    assert_eq!(scan_codes(&db), [(1, "misplaced-separator")]);
}

#[test]
fn test_unknown_keyword() {
    let db = mkdb(b"$c x $q $.");
    assert_eq!(scan_codes(&db), [(0, "unknown-keyword")]);
    assert_eq!(db.statement(0).math().len(), 1);
}

#[test]
fn test_bad_character() {
    let db = mkdb(b"$c x \x01y z $.");
    assert_eq!(scan_codes(&db), [(0, "bad-character")]);
    assert_eq!(db.statement(0).math().len(), 2);
    assert_eq!(db.scan_diagnostics()[0].1.arg("byte").unwrap().to_string(), "0x01");
}

#[test]
fn test_embedded_metacomment() {
    let db = mkdb(b"$c x $( $t typesetting $) $.");
    assert_eq!(scan_codes(&db), [(0, "embedded-metacomment")]);
}

#[test]
fn test_include() {
    let mut db = Database::default();
    db.parse_with(
        "root.mm",
        vec![
            ("root.mm".to_owned(), b"$[ lib.mm $] $c x $.\n".to_vec()),
            ("lib.mm".to_owned(), b"$c y $.\n".to_vec()),
        ],
    )
    .unwrap();
    assert_eq!(
        types(&db),
        [
            StatementType::Include,
            StatementType::Constant,
            StatementType::Constant,
            StatementType::Eof
        ]
    );
    assert_eq!(as_str(&db.text()), "$[ lib.mm $]$c y $.\n $c x $.\n");
    assert_eq!(as_str(&db.raw_text(2)), "\n $c x $.");
    assert_eq!(db.sources().len(), 2);
    assert!(db.chain().has_includes());
}

#[test]
fn test_repeated_include() {
    let mut db = Database::default();
    db.parse_with(
        "root.mm",
        vec![
            ("root.mm".to_owned(), b"$[ lib.mm $] $[ lib.mm $]".to_vec()),
            ("lib.mm".to_owned(), b"$c y $.".to_vec()),
        ],
    )
    .unwrap();
    let constants = db
        .statements()
        .iter()
        .filter(|stmt| stmt.statement_type() == StatementType::Constant)
        .count();
    assert_eq!(constants, 1);
}

#[test]
fn test_include_errors() {
    let db = mkdb(b"$[ $] $[ a b $]");
    assert_eq!(scan_codes(&db)[..2], [(0, "include-empty"), (1, "include-multiple")]);
}

#[test]
fn test_include_failure() {
    let db = mkdb(b"$[ missing.mm $] $c x $.");
    let diags = db.scan_diagnostics();
    assert_eq!(scan_codes(&db), [(1, "source-failed")]);
    assert_eq!(diags[0].1.arg("source").unwrap().to_string(), "missing.mm");
    assert_eq!(db.statement(1).statement_type(), StatementType::Constant);
}
