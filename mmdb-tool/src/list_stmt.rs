use mmdb_rs::statement::{Statement, StatementType};
use mmdb_rs::{as_str, Database};
use std::io::{self, Write};

pub fn list_statements(
    db: &mut Database,
    label_test: impl Fn(&[u8]) -> bool,
    out: &mut impl Write,
) -> io::Result<()> {
    let separator = "-".repeat(79);
    let scope = db.scope_result();
    let symbols = scope.symbols();
    for stmt in db.statements() {
        if stmt.statement_type().is_assertion() {
            if let Some(frame) = scope.frame(stmt.index()) {
                if !label_test(&*frame.label) {
                    continue;
                }
                for &(ix1, ix2) in &*frame.mandatory_dv {
                    writeln!(
                        out,
                        "$d {} {} $.",
                        as_str(symbols.name(frame.var_list[ix1])),
                        as_str(symbols.name(frame.var_list[ix2]))
                    )?;
                }
                for hyp in &*frame.hypotheses {
                    write_statement(db.statement(hyp.stmt()), out)?;
                }
                write_statement(stmt, out)?;
                writeln!(out, "{separator}")?;
            }
        }
    }
    Ok(())
}

pub fn write_statement(stmt: &Statement, out: &mut impl Write) -> io::Result<()> {
    write!(
        out,
        "{} ${}",
        as_str(stmt.label().unwrap_or_default()),
        match stmt.statement_type() {
            StatementType::Axiom => "a",
            StatementType::Essential => "e",
            StatementType::Floating => "f",
            StatementType::Provable => "p",
            _ => "x",
        }
    )?;
    for token in stmt.math() {
        write!(out, " {}", as_str(token))?;
    }
    writeln!(out, " $.")?;
    Ok(())
}

/// Statement counts per kind, in order of first appearance.
pub fn write_stats(db: &Database, out: &mut impl Write) -> io::Result<()> {
    let mut counts: Vec<(StatementType, usize)> = Vec::new();
    for stmt in db.statements() {
        let stype = stmt.statement_type();
        match counts.iter_mut().find(|(t, _)| *t == stype) {
            Some((_, count)) => *count += 1,
            None => counts.push((stype, 1)),
        }
    }
    for (stype, count) in counts {
        writeln!(out, "{stype:?}: {count}")?;
    }
    writeln!(out, "Sources: {}", db.sources().len())?;
    Ok(())
}
