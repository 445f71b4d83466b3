use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Declared problem size from a `p cnf <vars> <clauses>` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimacsInfo {
    pub vars: Option<u64>,
    pub clauses: Option<u64>,
}

/// Reads the header of a benchmark file. Unreadable files and missing or
/// malformed headers give an empty `DimacsInfo`.
pub fn parse_dimacs_header(path: &Path) -> DimacsInfo {
    match File::open(path) {
        Ok(file) => parse_dimacs_header_reader(BufReader::new(file)),
        Err(_) => DimacsInfo::default(),
    }
}

pub fn parse_dimacs_header_reader<R: BufRead>(mut r: R) -> DimacsInfo {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match r.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => return DimacsInfo::default(),
            Ok(_) => {}
        }
        let line = String::from_utf8_lossy(&buf);
        if line.starts_with("p cnf") {
            // only the first header line counts, even if it is malformed
            return parse_problem_line(&line);
        }
    }
}

fn parse_problem_line(line: &str) -> DimacsInfo {
    let parts = line.split_whitespace().collect::<Vec<_>>();
    if parts.len() < 4 {
        return DimacsInfo::default();
    }
    match (parts[2].parse::<u64>(), parts[3].parse::<u64>()) {
        (Ok(vars), Ok(clauses)) => DimacsInfo {
            vars: Some(vars),
            clauses: Some(clauses),
        },
        _ => DimacsInfo::default(),
    }
}
