use crate::grammar_tests::{index_of, mkdb};
use crate::scopeck::{Hyp, SymbolKind};
use crate::statement::StatementIndex;
use crate::Database;
use assert_matches::assert_matches;

const FRAME_DB: &[u8] = b"
    $c |- wff ( ) -> $.
    $v ph ps ch $.
    wph $f wff ph $.
    wps $f wff ps $.
    wch $f wff ch $.
    ${
        $d ph ps $.
        $d ps ch $.
        min $e |- ph $.
        ax $a |- ( ph -> ps ) $.
    $}
    ax2 $a |- ph $.
";

fn scope_codes(db: &mut Database) -> Vec<(StatementIndex, &'static str)> {
    db.scope_result()
        .diagnostics()
        .iter()
        .map(|(ix, diag)| (*ix, diag.code()))
        .collect()
}

#[test]
fn test_frame() {
    let mut db = mkdb(FRAME_DB);
    let scope = db.scope_result();
    assert!(scope.diagnostics().is_empty());
    let symbols = scope.symbols();
    let [ph, ps, ch] = [b"ph", b"ps", b"ch"].map(|name| symbols.lookup(name).unwrap());

    let frame = scope.frame(index_of(&db, "ax")).unwrap();
    let labels: Vec<&[u8]> = frame.hypotheses.iter().map(Hyp::label).collect();
    assert_eq!(labels, [&b"wph"[..], b"wps", b"min"]);
    assert_eq!(frame.mandatory_vars(), [ph, ps]);
    assert_eq!(&*frame.var_list, [ph, ps, ch]);
    assert_eq!(&*frame.mandatory_dv, [(0, 1)]);
    assert_eq!(&*frame.optional_hyps, [index_of(&db, "wch")]);
    assert_eq!(frame.target.len(), 5);
    assert!(frame.are_disjoint(ps, ch));
    assert!(frame.are_disjoint(ch, ps));
    assert!(!frame.are_disjoint(ph, ch));
    assert!(!frame.are_disjoint(ph, ph));

    // the block's $e and $d are gone
    let frame = scope.frame(index_of(&db, "ax2")).unwrap();
    let labels: Vec<&[u8]> = frame.hypotheses.iter().map(Hyp::label).collect();
    assert_eq!(labels, [&b"wph"[..]]);
    assert_eq!(frame.mandatory_count, 1);
    assert_eq!(frame.var_list.len(), 3);
    assert!(frame.mandatory_dv.is_empty());
    assert!(!frame.are_disjoint(ps, ch));
}

#[test]
fn test_hypotheses() {
    let mut db = mkdb(FRAME_DB);
    let scope = db.scope_result();
    let min = index_of(&db, "min");
    let turnstile = scope.symbols().lookup(b"|-").unwrap();
    let ph = scope.symbols().lookup(b"ph").unwrap();
    assert_matches!(scope.hyp(min), Some(Hyp::Essential { typecode, expr, .. }) => {
        assert_eq!(*typecode, turnstile);
        assert_eq!(&**expr, [ph]);
    });
    assert_matches!(
        scope.hyp(index_of(&db, "wph")),
        Some(Hyp::Floating { var, .. }) if *var == ph
    );
    assert!(scope.hyp(index_of(&db, "ax")).is_none());
}

#[test]
fn test_label_scope() {
    let mut db = mkdb(FRAME_DB);
    let scope = db.scope_result();
    let min = scope.label(b"min").unwrap();
    assert_eq!(min.index, index_of(&db, "min"));
    assert_eq!(min.end, index_of(&db, "ax") + 1);
    assert_eq!(scope.label(b"ax").unwrap().end, StatementIndex::MAX);
    assert!(scope.label(b"nothing").is_none());
}

#[test]
fn test_symbol_activity() {
    let mut db = mkdb(b"$c c $. $v x $. ${ $v y $. $} $v y $.");
    let scope = db.scope_result();
    assert!(scope.diagnostics().is_empty());
    let symbols = scope.symbols();
    let y = symbols.lookup(b"y").unwrap();
    assert_eq!(symbols.kind(y), SymbolKind::Variable);
    assert!(!symbols.is_active(y, 2));
    assert!(symbols.is_active(y, 3));
    assert!(!symbols.is_active(y, 4));
    assert!(symbols.is_active(y, 5));
    assert_eq!(symbols.len(), 3);
}

#[test]
fn test_duplicate_label() {
    let mut db = mkdb(b"$c wff |- $. $v x $. wx $f wff x $. wx $a |- x $.");
    assert_eq!(scope_codes(&mut db), [(3, "duplicate-label")]);
    let scope = db.scope_result();
    let diags = scope.diagnostics();
    assert_eq!(diags[0].1.arg("previous").unwrap().to_string(), "statement #2");
    assert!(scope.frame(3).is_none());
    assert!(scope.is_broken(3));
}

#[test]
fn test_math_checks() {
    let mut db = mkdb(b"$c wff |- $. $v x y $. wx $f wff x $. ax $a |- x y z $.");
    assert_eq!(
        scope_codes(&mut db),
        [(3, "variable-missing-float"), (3, "inactive-symbol")]
    );
    let mut db = mkdb(b"$c wff |- $. $v x $. wx $f wff x $. ax $a x |- $.");
    assert_eq!(scope_codes(&mut db), [(3, "typecode-not-constant")]);
}

#[test]
fn test_float_checks() {
    let mut db = mkdb(
        b"$c wff $. $v x $. wx $f wff x $. wx2 $f wff x $. w3 $f wff $. w4 $f x wff $. w5 $f wff wff $.",
    );
    assert_eq!(
        scope_codes(&mut db),
        [
            (3, "float-redeclared"),
            (4, "float-shape"),
            (5, "float-not-constant"),
            (6, "float-not-variable")
        ]
    );
}

#[test]
fn test_disjoint_checks() {
    let mut db = mkdb(b"$v x y $. $c c $. $d x x c $.");
    assert_eq!(
        scope_codes(&mut db),
        [(2, "disjoint-repeated"), (2, "disjoint-not-variable")]
    );
}

#[test]
fn test_block_checks() {
    let mut db = mkdb(b"$} ${ $c c $. ${");
    assert_eq!(
        scope_codes(&mut db),
        [(0, "unmatched-close"), (2, "constant-not-top-level"), (4, "unclosed-scope")]
    );
    let diags = db.scope_result().diagnostics();
    assert_eq!(diags[2].1.arg("count").unwrap().to_string(), "2");
}

#[test]
fn test_symbol_checks() {
    let mut db = mkdb(b"$c c c $. $v x $. ${ $v y $. $} $v y $. $v x $.");
    assert_eq!(
        scope_codes(&mut db),
        [(0, "symbol-redeclared"), (6, "symbol-redeclared")]
    );
    let mut db = mkdb(b"$c wff c $. $v x $. c $f wff x $. wx $f wff x $. $v wx $.");
    assert_eq!(
        scope_codes(&mut db),
        [(2, "label-is-symbol"), (4, "symbol-is-label")]
    );
}

#[test]
fn test_broken_hypothesis() {
    let mut db = mkdb(b"$c wff |- $. $v x $. wx $f wff x $. ${ e1 $e |- q $. ax $a |- x $. $}");
    assert_eq!(scope_codes(&mut db), [(4, "inactive-symbol")]);
    let scope = db.scope_result();
    assert!(scope.frame(5).is_none());
    assert!(scope.is_broken(5));
}
