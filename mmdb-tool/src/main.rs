//! A command-line front end for `mmdb-rs`: scans a database, runs the
//! requested passes and prints their diagnostics.

mod list_stmt;

use annotate_snippets::Renderer;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use list_stmt::{list_statements, write_stats};
use mmdb_rs::diag::Diagnostic;
use mmdb_rs::source::{FsResolver, MemoryResolver, SourceResolver};
use mmdb_rs::statement::StatementIndex;
use mmdb_rs::{Database, DbOptions};
use simple_logger::SimpleLogger;
use std::io::{self, stdout, Write};

/// A Metamath database scanner and proof verifier
#[derive(Debug, clap::Parser)]
#[command(version, about, verbatim_doc_comment)]
struct Cli {
    /// Database file to load
    #[arg(id("DATABASE"), required_unless_present("text"))]
    db: Option<String>,
    /// Provides raw database content on the command line
    #[arg(long, value_names(&["NAME", "TEXT"]))]
    text: Vec<String>,
    /// Prints milliseconds after each stage
    #[arg(long = "time")]
    timing: bool,
    /// Checks proof validity
    #[arg(short, long)]
    verify: bool,
    /// Checks grammar
    #[arg(short, long)]
    grammar: bool,
    /// Parses all statements according to the database's grammar
    #[arg(short, long)]
    parse_stmt: bool,
    /// Checks that printing parsed statements gives back the original formulas
    #[arg(long)]
    verify_parse_stmt: bool,
    /// Dumps the database's grammar
    #[arg(short = 'G', long)]
    dump_grammar: bool,
    /// Dumps the formulas of this database
    #[arg(short = 'F', long)]
    dump_formula: bool,
    /// List all axioms and theorems of this database with their frames
    #[arg(short = 'S', long)]
    list_statements: bool,
    /// Prints statement counts per kind
    #[arg(long)]
    stats: bool,
    /// Grammar categories, tightest binding first
    #[arg(long, value_delimiter = ',', value_name("CATEGORIES"))]
    categories: Vec<String>,
    /// Parses statements of a logical typecode as a grammar category
    #[arg(long, value_name("TYPE=CAT"), value_parser = parse_role)]
    role: Vec<(String, String)>,
    /// Records exact token positions while scanning
    #[arg(long)]
    eager_positions: bool,
    /// Formula length above which proofs are replayed with shared strings
    #[arg(long, value_name("LENGTH"))]
    abr_threshold: Option<usize>,
    /// Activates debug logs, including for the grammar building and statement parsing
    #[arg(long)]
    debug: bool,
}

fn parse_role(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((typecode, category)) if !typecode.is_empty() && !category.is_empty() => {
            Ok((typecode.to_owned(), category.to_owned()))
        }
        _ => Err(format!("expected TYPE=CAT, found {arg:?}")),
    }
}

fn main() {
    let cli = Cli::parse();
    let mut cmd = Cli::command();

    let defaults = DbOptions::default();
    let options = DbOptions {
        lazy_positions: !cli.eager_positions,
        categories: cli.categories.clone(),
        roles: if cli.role.is_empty() {
            defaults.roles
        } else {
            cli.role.clone()
        },
        abr_threshold: cli.abr_threshold.unwrap_or(defaults.abr_threshold),
        timing: cli.timing,
    };

    if cli.debug {
        SimpleLogger::new().init().unwrap();
    }

    let mut data = Vec::new();
    for kv in cli.text.chunks(2) {
        if let [name, text] = kv {
            data.push((name.clone(), text.clone().into_bytes()));
        }
    }
    let start = match (&cli.db, data.first()) {
        (Some(db), _) => db.clone(),
        (None, Some((name, _))) => name.clone(),
        (None, None) => cmd
            .error(ErrorKind::MissingRequiredArgument, "no database given")
            .exit(),
    };
    let resolver: Box<dyn SourceResolver> = if data.is_empty() {
        Box::<FsResolver>::default()
    } else {
        Box::new(MemoryResolver::new(data))
    };

    let mut db = Database::new(options);
    if let Err(err) = db.parse(&start, resolver) {
        cmd.error(ErrorKind::Io, err).exit();
    }

    if cli.verify {
        db.verify_result();
    }

    if cli.grammar {
        db.grammar_result();
    }

    if cli.parse_stmt {
        db.stmt_parse_result();
    }

    let mut diags = db.diagnostics();
    let mut out = stdout().lock();

    if cli.list_statements {
        report(&mut diags, list_statements(&mut db, |_label| true, &mut out));
    }

    let r = Renderer::styled();
    let mut count = db
        .render_diags(diags, |msg| println!("{}", r.render(msg)))
        .len();

    if cli.verify_parse_stmt {
        let diags = db.verify_parse_stmt();
        count += db
            .render_diags(diags, |msg| println!("{}", r.render(msg)))
            .len();
    }

    println!("{count} diagnostics issued.");

    let mut late = Vec::new();
    if cli.stats {
        report(&mut late, write_stats(&db, &mut out));
    }

    if cli.dump_grammar {
        report(&mut late, db.dump_grammar(&mut out));
    }

    if cli.dump_formula {
        report(&mut late, db.dump_formula(&mut out));
    }
    report(&mut late, out.flush());
    drop(out);

    count += db
        .render_diags(late, |msg| eprintln!("{}", r.render(msg)))
        .len();

    // Exit with code 1 if any warning or error were encountered
    let code = if count > 0 { 1 } else { 0 };
    std::process::exit(code);
}

/// Turns a failed write into a diagnostic on the first statement.
fn report(diags: &mut Vec<(StatementIndex, Diagnostic)>, result: io::Result<()>) {
    if let Err(err) = result {
        diags.push((StatementIndex::default(), err.into()));
    }
}
