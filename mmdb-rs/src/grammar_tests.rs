use crate::database::{Database, DbOptions};
use crate::diag::Diagnostic;
use crate::grammar::{Expected, ParseOutcome};
use crate::statement::StatementIndex;
use crate::util::as_str;
use assert_matches::assert_matches;

const GRAMMAR_DB: &[u8] = b"
    $c |- wff class ( ) + = $.
    $v A B $.
    cA $f class A $.
    cB $f class B $.
    weq $a wff A = B $.
    cadd $a class ( A + B ) $.
    ax-com $a |- ( A + B ) = ( B + A ) $.
";

pub(crate) fn mkdb_with(options: DbOptions, text: &[u8]) -> Database {
    let mut db = Database::new(options);
    db.parse_with("test.mm", vec![("test.mm".to_owned(), text.to_owned())])
        .unwrap();
    db
}

pub(crate) fn mkdb(text: &[u8]) -> Database {
    mkdb_with(DbOptions::default(), text)
}

pub(crate) fn index_of(db: &Database, label: &str) -> StatementIndex {
    db.statement_by_label(label.as_bytes()).unwrap().index()
}

fn codes(diags: &[(StatementIndex, Diagnostic)]) -> Vec<(StatementIndex, &'static str)> {
    diags.iter().map(|(ix, diag)| (*ix, diag.code())).collect()
}

#[test]
fn test_db_stmt_parse() {
    let mut db = mkdb(GRAMMAR_DB);
    let grammar = db.grammar_result();
    let stmt_parse = db.stmt_parse_result();
    assert!(db.scope_result().diagnostics().is_empty());
    assert!(grammar.diagnostics().is_empty());
    assert!(stmt_parse.diagnostics().is_empty());
    assert!(db.verify_parse_stmt().is_empty());
}

#[test]
fn test_derived_category_order() {
    let mut db = mkdb(GRAMMAR_DB);
    let grammar = db.grammar_result();
    let names: Vec<&str> = grammar
        .categories()
        .map(|cat| as_str(grammar.category_name(cat)))
        .collect();
    assert_eq!(names, ["class", "wff"]);
    let wff = grammar.category(b"wff").unwrap();
    let turnstile = grammar.symbols().lookup(b"|-").unwrap();
    assert_eq!(grammar.role(turnstile), Some(wff));
}

#[test]
fn test_db_formula() {
    let mut db = mkdb(GRAMMAR_DB);
    let stmt_parse = db.stmt_parse_result();
    let grammar = stmt_parse.grammar();
    let formula = stmt_parse.get_formula(index_of(&db, "ax-com")).unwrap();
    let labels: Vec<&str> = formula.labels(grammar).into_iter().map(as_str).collect();
    assert_eq!(labels, ["weq", "cadd", "cA", "cB", "cadd", "cB", "cA"]);
    assert_eq!(formula.size(), 7);
    assert_eq!(
        formula.as_ref(grammar).as_sexpr(),
        "(weq (cadd cA cB) (cadd cB cA))"
    );
    assert_eq!(
        formula.as_ref(grammar).to_string(),
        "wff ( A + B ) = ( B + A )"
    );
    // syntax axioms are not parsed
    assert!(stmt_parse.get_formula(index_of(&db, "cadd")).is_none());
}

#[test]
fn test_dump_formula() {
    let mut db = mkdb(GRAMMAR_DB);
    let mut out = Vec::new();
    db.dump_formula(&mut out).unwrap();
    assert_eq!(
        as_str(&out),
        "Formula Dump:\nax-com: (weq (cadd cA cB) (cadd cB cA))\n"
    );
}

#[test]
fn test_dump_grammar() {
    let mut db = mkdb(GRAMMAR_DB);
    let mut out = Vec::new();
    db.dump_grammar(&mut out).unwrap();
    let text = as_str(&out);
    assert!(text.starts_with("Grammar has 2 categories, 4 rules"));
    assert!(text.contains("  cadd: ( <class> + <class> )\n"));
    assert!(text.contains("  weq: <class> = <class>\n"));
}

#[test]
fn test_explicit_categories() {
    let options = DbOptions {
        categories: vec!["class".to_owned(), "wff".to_owned()],
        ..DbOptions::default()
    };
    let mut db = mkdb_with(options, GRAMMAR_DB);
    assert!(db.stmt_parse_result().diagnostics().is_empty());
    assert_eq!(db.grammar_result().rules().len(), 4);
}

#[test]
fn test_ambiguous() {
    let mut db = mkdb(
        b"
        $c |- wff ( ) + $.
        $v ph ps $.
        wph $f wff ph $.
        wps $f wff ps $.
        wa1 $a wff ( ph + ps ) $.
        wa2 $a wff ( ph + ps ) $.
        ax $a |- ( ph + ps ) $.
    ",
    );
    let ax = index_of(&db, "ax");
    let diags = db.stmt_parse_result().diagnostics();
    assert_eq!(codes(&diags), [(ax, "ambiguous")]);
    let diag = &diags[0].1;
    assert_eq!(diag.arg("first").unwrap().to_string(), "wa1");
    assert_eq!(diag.arg("second").unwrap().to_string(), "wa2");
}

#[test]
fn test_ambiguous_terminal() {
    let mut db = mkdb(
        b"
        $c |- wff A $.
        wA1 $a wff A $.
        wA2 $a wff A $.
        ax $a |- A $.
    ",
    );
    let ax = index_of(&db, "ax");
    let grammar = db.grammar_result();
    let wff = grammar.category(b"wff").unwrap();
    let a = grammar.symbols().lookup(b"A").unwrap();
    let outcome = grammar.parse_tokens(wff, ax, &[a]);
    assert_matches!(outcome, ParseOutcome::Ambiguous { first, second } => {
        assert_eq!(&*grammar.rule(first).label, b"wA1");
        assert_eq!(&*grammar.rule(second).label, b"wA2");
    });
}

#[test]
fn test_left_recursive() {
    let mut db = mkdb(
        b"
        $c |- wff -> $.
        $v ph ps $.
        wph $f wff ph $.
        wps $f wff ps $.
        wi $a wff ph -> ps $.
    ",
    );
    let wi = index_of(&db, "wi");
    let grammar = db.grammar_result();
    assert_eq!(codes(&grammar.diagnostics()), [(wi, "syntax-left-recursive")]);
    assert!(grammar.rules().iter().all(|rule| &*rule.label != b"wi"));
}

#[test]
fn test_logical_hypothesis() {
    let mut db = mkdb(
        b"
        $c |- wff T. $.
        ${
            h $e |- T. $.
            wbad $a wff T. $.
        $}
    ",
    );
    let wbad = index_of(&db, "wbad");
    let grammar = db.grammar_result();
    let diags = grammar.diagnostics();
    assert_eq!(codes(&diags), [(wbad, "syntax-logical-hypothesis")]);
    assert_eq!(diags[0].1.arg("hyp").unwrap().to_string(), "h");
}

#[test]
fn test_no_parse() {
    let mut db = mkdb(
        b"
        $c |- wff ( ) -> $.
        $v ph ps $.
        wph $f wff ph $.
        wps $f wff ps $.
        wi $a wff ( ph -> ps ) $.
        ax-bad $a |- ( ph ps ) $.
    ",
    );
    let bad = index_of(&db, "ax-bad");
    let diags = db.stmt_parse_result().diagnostics();
    assert_eq!(codes(&diags), [(bad, "no-parse")]);
    assert_eq!(diags[0].1.arg("expected").unwrap().to_string(), "->");

    let grammar = db.grammar_result();
    let symbols = grammar.symbols();
    let tokens: Vec<_> = [&b"("[..], b"ph", b"ps", b")"]
        .iter()
        .map(|tok| symbols.lookup(tok).unwrap())
        .collect();
    let wff = grammar.category(b"wff").unwrap();
    let arrow = symbols.lookup(b"->").unwrap();
    assert_matches!(
        grammar.parse_tokens(wff, bad, &tokens),
        ParseOutcome::NoParse { highwater: 2, expected } if expected == [Expected::Token(arrow)]
    );
}

#[test]
fn test_trailing() {
    let mut db = mkdb(
        b"
        $c |- wff $.
        $v ph ps $.
        wph $f wff ph $.
        wps $f wff ps $.
        ax $a |- ph ps $.
    ",
    );
    let ax = index_of(&db, "ax");
    let diags = db.stmt_parse_result().diagnostics();
    assert_eq!(codes(&diags), [(ax, "trailing-symbols")]);
    assert_eq!(diags[0].1.arg("symbol").unwrap().to_string(), "ps");
}

#[test]
fn test_syntactic_statements() {
    let mut db = mkdb(
        b"
        $c |- wff T. $.
        wtru $a wff T. $.
        ${
            h $e wff T. $.
            th $p wff T. $= wtru $.
        $}
    ",
    );
    let h = index_of(&db, "h");
    let th = index_of(&db, "th");
    let diags = db.stmt_parse_result().diagnostics();
    assert_eq!(
        codes(&diags),
        [(h, "syntactic-hypothesis"), (th, "syntactic-statement")]
    );
}

#[test]
fn test_scoped_float() {
    // the $f rule is not visible after its block closes
    let mut db = mkdb(
        b"
        $c |- wff $.
        $v ph $.
        ${
            wph $f wff ph $.
            ax-1 $a |- ph $.
        $}
        ${
            ax-2 $a |- ph $.
        $}
    ",
    );
    let stmt_parse = db.stmt_parse_result();
    assert!(stmt_parse.get_formula(index_of(&db, "ax-1")).is_some());
    assert!(stmt_parse.get_formula(index_of(&db, "ax-2")).is_none());
}
