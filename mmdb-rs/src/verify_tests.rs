use crate::database::DbOptions;
use crate::grammar_tests::{index_of, mkdb, mkdb_with};

const PROP_DB: &str = "
    $c |- wff ( ) -> $.
    $v ph ps ch $.
    wph $f wff ph $.
    wps $f wff ps $.
    wch $f wff ch $.
    wi $a wff ( ph -> ps ) $.
    ${
        min $e |- ph $.
        maj $e |- ( ph -> ps ) $.
        ax-mp $a |- ps $.
    $}
    ax-1 $a |- ( ph -> ( ps -> ph ) ) $.
";

/// Appends a theorem to the propositional fragment and returns the codes of
/// its verification diagnostics.
fn check(theorem: &str) -> Vec<&'static str> {
    let mut db = mkdb(format!("{PROP_DB}{theorem}").as_bytes());
    let th = index_of(&db, "th");
    assert!(db.scope_result().diagnostics().is_empty());
    db.verify_one(th)
        .diagnostics
        .iter()
        .map(|diag| diag.code())
        .collect()
}

#[test]
fn test_axiom_step() {
    let mut db = mkdb(b"$c |- x $. y $a |- x $. th $p |- x $= y $.");
    let th = index_of(&db, "th");
    let report = db.verify_one(th);
    assert!(report.diagnostics.is_empty());
    assert_eq!(report.depth, 1);

    let mut db = mkdb(b"$c |- x $. y $a |- x $. th $p |- x $= y y $.");
    let th = index_of(&db, "th");
    let report = db.verify_one(th);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].code(), "bad-stack-depth");
}

#[test]
fn test_simple_proof() {
    assert!(check("th $p |- ( ph -> ( ph -> ph ) ) $= wph wph ax-1 $.").is_empty());
}

#[test]
fn test_modus_ponens() {
    let theorem = "
        ${
            a1 $e |- ph $.
            th $p |- ( ps -> ph ) $= wph wps wph wi a1 wph wps ax-1 ax-mp $.
        $}
    ";
    assert!(check(theorem).is_empty());
}

#[test]
fn test_verify_pass() {
    let mut db = mkdb(
        format!("{PROP_DB} th $p |- ( ph -> ( ph -> ph ) ) $= wph wph ax-1 $.").as_bytes(),
    );
    let th = index_of(&db, "th");
    let result = db.verify_result();
    assert_eq!(result.len(), 1);
    assert!(result.diagnostics().is_empty());
    assert!(result.report(th).unwrap().is_valid());
    assert_eq!(result.report(th).unwrap().depth, 1);
}

#[test]
fn test_wrong_goal() {
    assert_eq!(
        check("th $p |- ( ph -> ( ph -> ph ) ) $= wph wps ax-1 $."),
        ["wrong-goal"]
    );
}

#[test]
fn test_wrong_type_end() {
    assert_eq!(check("th $p |- ph $= wph $."), ["wrong-type-end"]);
}

#[test]
fn test_bad_stack_depth() {
    let mut db = mkdb(
        format!("{PROP_DB} th $p |- ( ph -> ( ph -> ph ) ) $= wph wph ax-1 wph $.").as_bytes(),
    );
    let th = index_of(&db, "th");
    let report = db.verify_one(th);
    assert_eq!(report.depth, 2);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].code(), "bad-stack-depth");
    assert_eq!(report.diagnostics[0].arg("depth").unwrap().to_string(), "2");
}

#[test]
fn test_stack_underflow() {
    assert_eq!(
        check("th $p |- ( ph -> ( ph -> ph ) ) $= wph ax-1 $."),
        ["stack-underflow"]
    );
}

#[test]
fn test_unknown_step() {
    assert_eq!(
        check("th $p |- ( ph -> ( ph -> ph ) ) $= wph foo ax-1 $."),
        ["unknown-step"]
    );
    // a hypothesis whose block has been closed
    assert_eq!(check("th $p |- ph $= min $."), ["unknown-step"]);
    // a later assertion
    assert_eq!(
        check("th $p |- ( ph -> ( ph -> ph ) ) $= wph wph ax-2 $. ax-2 $a |- ( ph -> ( ps -> ph ) ) $."),
        ["unknown-step"]
    );
}

#[test]
fn test_type_mismatch() {
    let theorem = "
        ${
            h $e |- ph $.
            th $p |- ( ph -> ( ph -> ph ) ) $= h h ax-1 $.
        $}
    ";
    let mut db = mkdb(format!("{PROP_DB}{theorem}").as_bytes());
    let th = index_of(&db, "th");
    let report = db.verify_one(th);
    assert_eq!(report.diagnostics.len(), 1);
    let diag = &report.diagnostics[0];
    assert_eq!(diag.code(), "type-mismatch");
    assert_eq!(diag.arg("hyp").unwrap().to_string(), "wph");
    assert_eq!(diag.arg("expected").unwrap().to_string(), "wff");
    assert_eq!(diag.arg("found").unwrap().to_string(), "|-");
}

#[test]
fn test_hyp_mismatch() {
    let theorem = "
        ${
            a1 $e |- ps $.
            th $p |- ( ps -> ph ) $= wph wps wph wi a1 wph wps ax-1 ax-mp $.
        $}
    ";
    let mut db = mkdb(format!("{PROP_DB}{theorem}").as_bytes());
    let th = index_of(&db, "th");
    let report = db.verify_one(th);
    assert_eq!(report.diagnostics.len(), 1);
    let diag = &report.diagnostics[0];
    assert_eq!(diag.code(), "hyp-mismatch");
    assert_eq!(diag.arg("hyp").unwrap().to_string(), "min");
    assert_eq!(diag.arg("expected").unwrap().to_string(), "\"ph\"");
    assert_eq!(diag.arg("found").unwrap().to_string(), "\"ps\"");
}

#[test]
fn test_compressed() {
    let theorem = "
        ${
            a1 $e |- ph $.
            th $p |- ( ps -> ph ) $= ( wi ax-1 ax-mp ) ABADCABEF $.
        $}
    ";
    assert!(check(theorem).is_empty());
}

#[test]
fn test_compressed_saved_step() {
    let theorem = "
        ${
            a1 $e |- ph $.
            th $p |- ( ps -> ph ) $= ( wi ax-1 ax-mp ) AZBGDCGBEF $.
        $}
    ";
    assert!(check(theorem).is_empty());
}

#[test]
fn test_compressed_errors() {
    let cases = [
        ("( wi ax-1 ax-mp ) ABADCABEG", "compressed-recall-range"),
        ("( wi ax-1 ax-mp ) ABADCABEFU", "compressed-leftover"),
        ("( wi ax-1 ax-mp ) ZA", "compressed-bad-save"),
        ("( wi ax-1 ax-mp ) ABa", "compressed-bad-char"),
        ("( wi ax-1 ax-mp", "compressed-unclosed-roster"),
        ("( wph wi ax-1 ax-mp ) ABADCABEF", "roster-hypothesis"),
        ("( wi ax-3 ax-mp ) ABADCABEF", "unknown-step"),
    ];
    for (proof, code) in cases {
        let theorem = format!(
            "
            ${{
                a1 $e |- ph $.
                th $p |- ( ps -> ph ) $= {proof} $.
            $}}
        "
        );
        assert_eq!(check(&theorem), [code], "{proof}");
    }
}

#[test]
fn test_recall_range_number() {
    let theorem = "
        ${
            a1 $e |- ph $.
            th $p |- ( ps -> ph ) $= ( wi ax-1 ax-mp ) ABADCABEG $.
        $}
    ";
    let mut db = mkdb(format!("{PROP_DB}{theorem}").as_bytes());
    let th = index_of(&db, "th");
    let report = db.verify_one(th);
    assert_eq!(report.diagnostics[0].arg("number").unwrap().to_string(), "7");
}

#[test]
fn test_incomplete() {
    let theorem = "
        ${
            a1 $e |- ph $.
            th $p |- ( ps -> ph ) $= wph wps wph wi ? wph wps ax-1 ax-mp $.
        $}
    ";
    let mut db = mkdb(format!("{PROP_DB}{theorem}").as_bytes());
    let th = index_of(&db, "th");
    let report = db.verify_one(th);
    assert!(report.incomplete);
    assert!(report.is_valid());
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].code(), "incomplete-proof");
}

#[test]
fn test_unknown_only() {
    assert_eq!(check("th $p |- ph $= ? $."), ["incomplete-proof"]);
    assert_eq!(check("th $p |- ph $= ( ) ? $."), ["incomplete-proof"]);
}

#[test]
fn test_incomplete_still_checked() {
    // the known entries are still checked around unknown ones
    assert_eq!(check("th $p |- ph $= wph wps ? ? ax-mp $."), ["wrong-goal"]);
}

const DV_DB: &str = "
    $c |- wff setvar ( ) -> A. $.
    $v x y ph $.
    vx $f setvar x $.
    vy $f setvar y $.
    wph $f wff ph $.
    wal $a wff A. x ph $.
    ${
        $d x ph $.
        ax-5 $a |- ( ph -> A. x ph ) $.
        th2 $p |- ( ph -> A. x ph ) $= vx wph ax-5 $.
    $}
";

#[test]
fn test_dv_satisfied() {
    let mut db = mkdb(DV_DB.as_bytes());
    let th2 = index_of(&db, "th2");
    assert!(db.verify_one(th2).diagnostics.is_empty());
}

#[test]
fn test_dv_violation() {
    let mut db = mkdb(
        format!("{DV_DB} th $p |- ( A. x ph -> A. x A. x ph ) $= vx vx wph wal ax-5 $.")
            .as_bytes(),
    );
    let th = index_of(&db, "th");
    let report = db.verify_one(th);
    let pairs: Vec<(String, String)> = report
        .diagnostics
        .iter()
        .map(|diag| {
            assert_eq!(diag.code(), "dv-violation");
            (
                diag.arg("first").unwrap().to_string(),
                diag.arg("second").unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(pairs.len(), 2);
    assert!(pairs.contains(&("x".to_owned(), "x".to_owned())));
    assert!(pairs.contains(&("x".to_owned(), "ph".to_owned())));
}

#[test]
fn test_persistent_restart() {
    let options = DbOptions {
        abr_threshold: 4,
        ..DbOptions::default()
    };
    let theorem = "
        ${
            a1 $e |- ph $.
            th $p |- ( ps -> ph ) $= ( wi ax-1 ax-mp ) ABADCABEF $.
        $}
    ";
    let mut db = mkdb_with(options, format!("{PROP_DB}{theorem}").as_bytes());
    let th = index_of(&db, "th");
    let report = db.verify_one(th);
    assert!(report.persistent);
    assert!(report.diagnostics.is_empty());
}

/// `( ph & ph )` nested `depth` times.
fn doubled(depth: usize) -> String {
    let mut formula = "ph".to_owned();
    for _ in 0..depth {
        formula = format!("( {formula} & {formula} )");
    }
    formula
}

#[test]
fn test_persistent_doubling() {
    let options = DbOptions {
        abr_threshold: 8,
        ..DbOptions::default()
    };
    let text = format!(
        "
        $c wff ( ) & $.
        $v ph $.
        wph $f wff ph $.
        wa $a wff ( ph & ph ) $.
        th $p wff {} $= ( wa ) AZCBZDBZEB $.
        bad $p wff {} $= ( wa ) AZCBZDBZEB $.
    ",
        doubled(3),
        doubled(2)
    );
    let mut db = mkdb_with(options, text.as_bytes());
    let th = index_of(&db, "th");
    let report = db.verify_one(th);
    assert!(report.persistent);
    assert!(report.diagnostics.is_empty());

    let bad = index_of(&db, "bad");
    let report = db.verify_one(bad);
    assert!(report.persistent);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].code(), "wrong-goal");
}

#[test]
#[should_panic(expected = "is not a $p statement")]
fn test_verify_one_axiom() {
    let mut db = mkdb(PROP_DB.as_bytes());
    let ax = index_of(&db, "ax-1");
    let _ = db.verify_one(ax);
}
