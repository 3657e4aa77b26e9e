//! # Patcher Logic
//!
//! The core of ewpatch. It is responsible for:
//! 1. Reading the project file and scanning it for the linker library option (`patch_with`).
//! 2. Deciding which single line to edit, if any (`plan`).
//! 3. Writing the result back in place, optionally after a backup.
//! 4. Reporting what the option currently holds without editing (`inspect_with`).
//!
//! Every outcome that leaves the file untouched is reported distinctly, so the
//! CLI can tell "linked" apart from "nothing to do" and "could not find it".

use std::fmt;
use std::path::PathBuf;
use anyhow::{Result, bail};
use log::{debug, info, warn};
use serde::Serialize;
use crate::invariant_ppt::assert_invariant;
use crate::scan::{self, OptionSite, StateValue, Target};
use crate::store::{self, FsStore, ProjectStore};

/// Project patched when none is given on the command line.
pub const DEFAULT_PROJECT: &str = "embProj.ewp";
/// TivaWare peripheral driver library, as built for EWARM.
pub const DEFAULT_LIB: &str = r"C:\ti\TivaWare_C_Series-2.2.0.295\driverlib\ewarm\Exe\driverlib.lib";

pub const INV_SINGLE_EDIT: &str = "A patch edits at most one line of the project";
pub const INV_CARRIES_LIB: &str = "The edited line carries the library path";

/// What to do when the option already lists a different library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExistingPolicy {
    /// Leave the file untouched.
    #[default]
    Keep,
    /// Replace the existing value.
    Overwrite,
    /// Add the library as an extra `<state>` line.
    Append,
}

#[derive(Debug, Clone)]
pub struct PatchOptions {
    pub project: PathBuf,
    pub lib: String,
    pub target: Target,
    pub on_existing: ExistingPolicy,
    pub dry_run: bool,
    pub backup: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            project: PathBuf::from(DEFAULT_PROJECT),
            lib: DEFAULT_LIB.to_string(),
            target: Target::default(),
            on_existing: ExistingPolicy::default(),
            dry_run: false,
            backup: false,
        }
    }
}

/// Result of a patch run. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The empty option value was filled.
    Patched { line: usize },
    /// An existing value was replaced.
    Overwritten { line: usize, previous: String },
    /// A new value line was inserted.
    Appended { line: usize },
    /// The library is already listed.
    AlreadyPresent { line: usize },
    /// The option holds another value and the policy is `keep`.
    Occupied { line: usize, value: String },
    /// No usable option site in the target configuration.
    NotFound,
}

impl Outcome {
    /// Whether the line sequence was edited.
    pub fn changed(&self) -> bool {
        matches!(
            self,
            Outcome::Patched { .. } | Outcome::Overwritten { .. } | Outcome::Appended { .. }
        )
    }

    /// `0` when the library ends up linked, `2` when nothing could be done.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::NotFound | Outcome::Occupied { .. } => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Patched { line } => write!(f, "filled empty library option at line {}", line),
            Outcome::Overwritten { line, previous } => {
                write!(f, "replaced '{}' at line {}", previous, line)
            }
            Outcome::Appended { line } => write!(f, "added library at line {}", line),
            Outcome::AlreadyPresent { line } => write!(f, "library already listed at line {}", line),
            Outcome::Occupied { line, value } => write!(
                f,
                "option already holds '{}' at line {} (use --on-existing overwrite|append)",
                value, line
            ),
            Outcome::NotFound => write!(f, "no library option found in the target configuration"),
        }
    }
}

/// A single-line change to the line sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Edit {
    Replace { index: usize, line: String },
    Insert { index: usize, line: String },
}

/// Patches the project on disk.
pub fn patch_project(opts: &PatchOptions) -> Result<Outcome> {
    patch_with(&FsStore, opts)
}

/// Core logic, decoupled from the filesystem for testing.
pub fn patch_with(store: &impl ProjectStore, opts: &PatchOptions) -> Result<Outcome> {
    let original = store.read_project(&opts.project)?;
    let mut lines = scan::split_lines(&original);
    debug!("Read {} lines from {:?}", lines.len(), opts.project);

    let sites = scan::scan(&lines, &opts.target);
    debug!(
        "Found {} '{}' site(s) in {}/{}",
        sites.len(), opts.target.option, opts.target.configuration, opts.target.tool
    );

    let lib = scan::escape_text(&opts.lib);
    let (outcome, edit) = plan(&lines, &sites, &lib, opts.on_existing);

    let Some(edit) = edit else {
        match &outcome {
            Outcome::AlreadyPresent { .. } => info!("{:?}: {}", opts.project, outcome),
            _ => warn!("{:?} left unchanged: {}", opts.project, outcome),
        }
        return Ok(outcome);
    };

    let before = lines.clone();
    let edited = apply(&mut lines, edit);

    let single = assert_invariant(is_single_edit(&before, &lines, &edited), INV_SINGLE_EDIT, "Patcher");
    let carries = assert_invariant(edited.line().contains(lib.as_str()), INV_CARRIES_LIB, "Patcher");
    if !single || !carries {
        bail!("Refusing to write {:?}: the planned edit is inconsistent", opts.project);
    }

    if opts.dry_run {
        println!("--- DRY RUN: {:?} would be updated ({}) ---", opts.project, outcome);
        println!("{}", edited.line().trim_end());
        return Ok(outcome);
    }

    if opts.backup {
        let backup = store::backup_path(&opts.project);
        store.write_backup(&backup, &original)?;
        info!("Backed up original project to {:?}", backup);
    }

    store.write_project(&opts.project, &lines.concat())?;
    info!("{:?}: {}", opts.project, outcome);
    Ok(outcome)
}

/// Picks the outcome and the edit for a scanned project.
///
/// 1. A site already listing `lib` (as its value or in the `<state>` lines right
///    after it) wins: nothing to do.
/// 2. Otherwise the first empty site is filled.
/// 3. Otherwise the first site with a value is handled per `policy`.
fn plan(
    lines: &[String],
    sites: &[OptionSite],
    lib: &str,
    policy: ExistingPolicy,
) -> (Outcome, Option<Edit>) {
    for site in sites {
        if let Some(offset) = listed_values(lines, site).iter().position(|v| v == lib) {
            return (Outcome::AlreadyPresent { line: site.value_index + offset + 1 }, None);
        }
    }

    if let Some(site) = sites.iter().find(|s| s.value == StateValue::Empty) {
        let index = site.value_index;
        let line = scan::fill_empty_state(&lines[index], lib);
        return (Outcome::Patched { line: index + 1 }, Some(Edit::Replace { index, line }));
    }

    let Some((site, value)) = sites.iter().find_map(|s| match &s.value {
        StateValue::Value(v) => Some((s, v.clone())),
        _ => None,
    }) else {
        return (Outcome::NotFound, None);
    };

    let index = site.value_index;
    match policy {
        ExistingPolicy::Keep => (Outcome::Occupied { line: index + 1, value }, None),
        ExistingPolicy::Overwrite => {
            let current = &lines[index];
            let line = match scan::state_bounds(current) {
                Some((start, end)) => format!("{}{}{}", &current[..start], lib, &current[end..]),
                None => return (Outcome::NotFound, None),
            };
            (
                Outcome::Overwritten { line: index + 1, previous: value },
                Some(Edit::Replace { index, line }),
            )
        }
        ExistingPolicy::Append => {
            let last = index + listed_values(lines, site).len() - 1;
            let anchor = &lines[last];
            let terminator = scan::terminator(anchor);
            let body = format!("{}{}", scan::indentation(anchor), scan::state_element(lib));
            let line = if terminator.is_empty() {
                // Last line of an unterminated file; the new line supplies the break.
                format!("\n{}", body)
            } else {
                format!("{}{}", body, terminator)
            };
            (Outcome::Appended { line: last + 2 }, Some(Edit::Insert { index: last + 1, line }))
        }
    }
}

/// The value of `site` followed by the values of directly following `<state>` lines.
fn listed_values(lines: &[String], site: &OptionSite) -> Vec<String> {
    match &site.value {
        StateValue::Value(_) => lines[site.value_index..]
            .iter()
            .map_while(|l| scan::state_bounds(l).map(|(s, e)| l[s..e].to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

/// The edited line, for reporting.
struct Edited {
    line: String,
    index: usize,
    inserted: bool,
}

impl Edited {
    fn line(&self) -> &str {
        &self.line
    }
}

fn apply(lines: &mut Vec<String>, edit: Edit) -> Edited {
    match edit {
        Edit::Replace { index, line } => {
            lines[index] = line.clone();
            Edited { line, index, inserted: false }
        }
        Edit::Insert { index, line } => {
            lines.insert(index, line.clone());
            Edited { line, index, inserted: true }
        }
    }
}

fn is_single_edit(before: &[String], after: &[String], edited: &Edited) -> bool {
    if edited.inserted {
        let mut probe = after.to_vec();
        probe.remove(edited.index);
        probe == before
    } else {
        before.len() == after.len()
            && before.iter().zip(after).filter(|(a, b)| a != b).count() <= 1
    }
}

/// One option site as reported by `inspect`. Line numbers are 1-based.
#[derive(Debug, Clone, Serialize)]
pub struct SiteReport {
    pub tag_line: usize,
    pub value_line: usize,
    pub value: StateValue,
    /// Values of further `<state>` lines right after the first one.
    pub additional: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub project: String,
    pub configuration: String,
    pub tool: String,
    pub option: String,
    pub sites: Vec<SiteReport>,
}

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{} / {} / {}]", self.project, self.configuration, self.tool, self.option)?;
        if self.sites.is_empty() {
            return writeln!(f, "  (option not found)");
        }
        for site in &self.sites {
            let value = match &site.value {
                StateValue::Empty => "<empty>".to_string(),
                StateValue::Value(v) => v.clone(),
                StateValue::Missing => "<no state element>".to_string(),
            };
            writeln!(f, "  line {}: {}", site.value_line, value)?;
            for extra in &site.additional {
                writeln!(f, "           {}", extra)?;
            }
        }
        Ok(())
    }
}

/// Reports the option sites of the project on disk.
pub fn inspect_project(project: &std::path::Path, target: &Target) -> Result<InspectReport> {
    inspect_with(&FsStore, project, target)
}

pub fn inspect_with(
    store: &impl ProjectStore,
    project: &std::path::Path,
    target: &Target,
) -> Result<InspectReport> {
    let lines = scan::split_lines(&store.read_project(project)?);
    let sites = scan::scan(&lines, target)
        .into_iter()
        .map(|site| {
            let additional = listed_values(&lines, &site).into_iter().skip(1).collect();
            SiteReport {
                tag_line: site.tag_index + 1,
                value_line: site.value_index + 1,
                value: site.value,
                additional,
            }
        })
        .collect();

    Ok(InspectReport {
        project: project.display().to_string(),
        configuration: target.configuration.clone(),
        tool: target.tool.clone(),
        option: target.option.clone(),
        sites,
    })
}
