use crate::database::{ChangeHint, ChangeObserver, Database, DbOptions, ReplaceError, StatementChange};
use crate::diag::Anchor;
use crate::grammar_tests::{index_of, mkdb, mkdb_with};
use crate::scopeck::ScopePass;
use crate::statement::StatementType;
use crate::util::as_str;
use assert_matches::assert_matches;
use std::cell::RefCell;
use std::rc::Rc;

const BASE: &[u8] = b"$c x $.\n$c y $.\n";

#[derive(Debug, PartialEq, Eq)]
struct Seen {
    hint: ChangeHint,
    index: usize,
    removed: Vec<usize>,
    added: Vec<usize>,
}

struct Recorder(Rc<RefCell<Vec<Seen>>>);

impl ChangeObserver for Recorder {
    fn on_change(&mut self, change: &StatementChange<'_>) {
        self.0.borrow_mut().push(Seen {
            hint: change.hint,
            index: change.index,
            removed: change.removed.iter().map(|s| s.index()).collect(),
            added: change.added.iter().map(|s| s.index()).collect(),
        });
    }
}

fn observed(db: &mut Database) -> Rc<RefCell<Vec<Seen>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    db.observe(Box::new(Recorder(log.clone())));
    log
}

#[test]
fn test_replace() {
    let mut db = mkdb(BASE);
    let log = observed(&mut db);
    db.replace_statements(1, 2, b"\n$c z w $.").unwrap();
    assert_eq!(as_str(&db.text()), "$c x $.\n$c z w $.\n");
    assert_eq!(db.statements().len(), 3);
    assert_eq!(db.statement(1).math().len(), 2);
    assert_eq!(db.statement(2).statement_type(), StatementType::Eof);
    assert_eq!(as_str(&db.raw_text(2)), "\n");
    for (index, stmt) in db.statements().iter().enumerate() {
        assert_eq!(stmt.index(), index);
    }
    assert_eq!(db.positions(1).keyword, 8);
    assert_eq!(db.positions(1).end, 17);
    assert_eq!(
        *log.borrow(),
        [Seen {
            hint: ChangeHint::Replace,
            index: 1,
            removed: vec![1],
            added: vec![1],
        }]
    );
}

#[test]
fn test_insert_and_delete() {
    let mut db = mkdb(b"$c x $.\n");
    let log = observed(&mut db);
    db.replace_statements(1, 1, b"\n$c y $.").unwrap();
    assert_eq!(as_str(&db.text()), "$c x $.\n$c y $.\n");
    db.replace_statements(0, 1, b"").unwrap();
    assert_eq!(as_str(&db.text()), "\n$c y $.\n");
    assert_eq!(db.statements().len(), 2);
    let log = log.borrow();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].hint, ChangeHint::Insert);
    assert_eq!(log[0].added, [1]);
    assert_eq!(log[1].hint, ChangeHint::Delete);
    assert_eq!(log[1].removed, [0]);
    assert!(log[1].added.is_empty());
}

#[test]
fn test_replace_tail() {
    let mut db = mkdb(BASE);
    db.replace_statements(1, 3, b"\n$c z $.  ").unwrap();
    assert_eq!(as_str(&db.text()), "$c x $.\n$c z $.  ");
    assert_eq!(db.statements().len(), 3);
    assert_eq!(as_str(&db.raw_text(2)), "  ");
}

#[test]
fn test_replace_rejected() {
    let mut db = mkdb(BASE);
    let log = observed(&mut db);
    assert_eq!(
        db.replace_statements(1, 2, b"$c z $."),
        Err(ReplaceError::NoLeadingWhitespace)
    );
    assert_eq!(
        db.replace_statements(2, 1, b""),
        Err(ReplaceError::OutOfRange { from: 2, to: 1, count: 3 })
    );
    assert_matches!(
        db.replace_statements(0, 9, b""),
        Err(ReplaceError::OutOfRange { .. })
    );
    assert_eq!(
        db.replace_statements(0, 0, b"$c z $."),
        Err(ReplaceError::NoSeparatingWhitespace)
    );
    assert_eq!(
        db.replace_statements(1, 1, b"\n$c $."),
        Err(ReplaceError::FragmentHasErrors)
    );
    assert_eq!(
        db.replace_statements(1, 1, b"\n$[ other.mm $]"),
        Err(ReplaceError::IncludesUnsupported)
    );
    assert_eq!(
        db.replace_statements(1, 1, b"\n$c z $.\n"),
        Err(ReplaceError::DuplicateEof)
    );
    assert_eq!(
        db.replace_statements(3, 3, b"\n$c z $."),
        Err(ReplaceError::DuplicateEof)
    );
    assert_eq!(db.text(), BASE);
    assert_eq!(db.statements().len(), 3);
    assert!(log.borrow().is_empty());
}

#[test]
fn test_replace_preconditions() {
    let mut empty = Database::default();
    assert_eq!(empty.replace_statements(0, 0, b""), Err(ReplaceError::Empty));

    let mut broken = mkdb(b"$c $.\n");
    assert_eq!(
        broken.replace_statements(1, 1, b"\n$c x $."),
        Err(ReplaceError::DatabaseHasErrors)
    );

    let mut included = Database::default();
    included
        .parse_with(
            "root.mm",
            vec![
                ("root.mm".to_owned(), b"$[ lib.mm $]\n".to_vec()),
                ("lib.mm".to_owned(), b"$c y $.".to_vec()),
            ],
        )
        .unwrap();
    assert_eq!(
        included.replace_statements(1, 1, b"\n$c x $."),
        Err(ReplaceError::IncludesUnsupported)
    );
}

#[test]
fn test_analyzers_invalidated() {
    let mut db = mkdb(b"$c wff $.\n$v x $.\nwx $f wff x $.\n");
    assert!(db.scope_result().diagnostics().is_empty());
    assert!(db.is_computed::<ScopePass>());
    db.replace_statements(2, 3, b"\nwx $f wff q $.").unwrap();
    assert!(!db.is_computed::<ScopePass>());
    let wx = index_of(&db, "wx");
    let diags = db.scope_result().diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].0, wx);
    assert_eq!(diags[0].1.code(), "float-not-variable");
    assert_eq!(db.diagnostics().len(), 1);
}

#[test]
fn test_labels_follow_edits() {
    let mut db = mkdb(b"$c wff $.\n$v x $.\nwx $f wff x $.\n");
    assert_eq!(index_of(&db, "wx"), 2);
    db.replace_statements(1, 1, b"\n$v y $.").unwrap();
    assert_eq!(index_of(&db, "wx"), 3);
    assert!(db.statement_by_label(b"wy").is_none());
}

#[test]
fn test_eager_positions_after_edit() {
    let options = DbOptions {
        lazy_positions: false,
        ..DbOptions::default()
    };
    let mut db = mkdb_with(options, BASE);
    db.replace_statements(0, 1, b"$c long name $.").unwrap();
    for stmt in db.statements() {
        assert!(stmt.cached_positions().is_some());
    }
    assert_eq!(db.positions(1).keyword, 16);
}

#[test]
fn test_locate() {
    let db = mkdb(b"$c x $.\n  ax $a x $.\n");
    let ax = index_of(&db, "ax");
    let label = db.locate(ax, &Anchor::Label);
    assert_eq!((label.from, label.to), (10, 12));
    let math = db.locate(ax, &Anchor::Math(0));
    assert_eq!((math.from, math.to), (16, 17));
    let whole = db.locate(ax, &Anchor::Statement);
    assert_eq!((whole.from, whole.to), (10, 20));
    let relative = db.locate(ax, &Anchor::Relative(3, 5));
    assert_eq!((relative.from, relative.to), (10, 12));
    assert_eq!(db.source(label.source).lookup_pos(label.from), (2, 3));
}
