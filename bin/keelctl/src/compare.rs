//! ---
//! keel_section: "06-operator-interfaces"
//! keel_subsection: "binary"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Control CLI for operators inspecting Keel stores."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::cmp::Ordering;

use anyhow::Result;
use clap::Args;
use keel_common::version;

/// Arguments for `keelctl compare`.
#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Left-hand version.
    pub left: String,
    /// Right-hand version.
    pub right: String,
}

/// Print whether `left` is older than, equal to, or newer than `right`.
pub fn run(args: CompareArgs) -> Result<()> {
    println!("{}", relation(&args.left, &args.right));
    Ok(())
}

fn relation(left: &str, right: &str) -> &'static str {
    match version::compare(left, right) {
        Ordering::Less => "older",
        Ordering::Equal => "equal",
        Ordering::Greater => "newer",
    }
}
