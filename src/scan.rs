//! # Scan Module
//!
//! Line-oriented scanning of IAR Embedded Workbench project files (`.ewp`).
//!
//! The project file is XML, but it is never parsed as such. Every setting lives
//! on its own line, so a single forward pass with three flags is enough to find the linker's "additional libraries" option of one build
//! configuration:
//!
//! ```text
//! <configuration>
//!     <name>Debug</name>            <- in_configuration
//!     <settings>                    <- new tool block, in_tool reset
//!         <name>ILINK</name>        <- in_tool
//!         <data>
//!             <option>
//!                 <name>IlinkAdditionalLibs</name>   <- at_option
//!                 <state></state>                    <- option site value
//! ```
//!
//! Matching is by substring, so indentation and line terminators are ignored
//! here and preserved by the caller.

use log::trace;
use serde::Serialize;

/// Configuration patched when none is given on the command line.
pub const DEFAULT_CONFIGURATION: &str = "Debug";
/// Name of the IAR linker tool block.
pub const LINKER_TOOL: &str = "ILINK";
/// Option holding the linker's additional library list.
pub const LIBS_OPTION: &str = "IlinkAdditionalLibs";

/// Build profiles every generated `.ewp` carries. Entering one of these ends
/// the target configuration.
const KNOWN_CONFIGURATIONS: [&str; 2] = ["Debug", "Release"];

const CONFIGURATION_START: &str = "<configuration>";
const TOOL_START: &str = "<settings>";
const EMPTY_STATE: &str = "<state></state>";
const STATE_OPEN: &str = "<state>";
const STATE_CLOSE: &str = "</state>";

/// Which option of which tool of which configuration we are looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub configuration: String,
    pub tool: String,
    pub option: String,
}

impl Target {
    /// The linker library option of `configuration`.
    pub fn new(configuration: &str) -> Self {
        Self {
            configuration: configuration.to_string(),
            tool: LINKER_TOOL.to_string(),
            option: LIBS_OPTION.to_string(),
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIGURATION)
    }
}

/// The `<name>` tags derived from a [`Target`], built once per scan.
struct Markers {
    configuration: String,
    leave_configuration: Vec<String>,
    tool: String,
    option: String,
}

impl Markers {
    fn new(target: &Target) -> Self {
        Self {
            configuration: name_tag(&target.configuration),
            leave_configuration: KNOWN_CONFIGURATIONS
                .iter()
                .filter(|c| **c != target.configuration)
                .map(|c| name_tag(c))
                .collect(),
            tool: name_tag(&target.tool),
            option: name_tag(&target.option),
        }
    }
}

fn name_tag(name: &str) -> String {
    format!("<name>{}</name>", name)
}

/// Content of the line following the option tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum StateValue {
    /// `<state></state>`
    Empty,
    /// `<state>text</state>`, text kept exactly as written (still XML-escaped).
    Value(String),
    /// Anything else; never edited.
    Missing,
}

/// One occurrence of the target option inside the target configuration and tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSite {
    /// 0-based index of the `<name>option</name>` line.
    pub tag_index: usize,
    /// 0-based index of the line right after it.
    pub value_index: usize,
    pub value: StateValue,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ScanState {
    in_configuration: bool,
    in_tool: bool,
    at_option: bool,
}

impl ScanState {
    /// Advances over one line. Returns the classified value when this line
    /// directly follows a matched option tag.
    fn step(self, line: &str, markers: &Markers) -> (Self, Option<StateValue>) {
        let mut next = self;
        next.at_option = false;

        if line.contains(CONFIGURATION_START) {
            next.in_configuration = false;
            next.in_tool = false;
        }
        if line.contains(&markers.configuration) {
            next.in_configuration = true;
        } else if markers.leave_configuration.iter().any(|tag| line.contains(tag.as_str())) {
            next.in_configuration = false;
            next.in_tool = false;
        }

        if line.contains(TOOL_START) {
            next.in_tool = false;
        }
        if next.in_configuration && line.contains(&markers.tool) {
            next.in_tool = true;
        }

        if next.in_configuration && next.in_tool && line.contains(&markers.option) {
            next.at_option = true;
        }

        let value = self.at_option.then(|| classify(line));
        (next, value)
    }
}

/// Finds every site of `target` in `lines`, in file order.
pub fn scan<S: AsRef<str>>(lines: &[S], target: &Target) -> Vec<OptionSite> {
    let markers = Markers::new(target);

    let (_, sites) = lines.iter().enumerate().fold(
        (ScanState::default(), Vec::new()),
        |(state, mut sites), (index, line)| {
            let (next, value) = state.step(line.as_ref(), &markers);
            if next != state {
                trace!("line {}: {:?}", index + 1, next);
            }
            if let Some(value) = value {
                sites.push(OptionSite {
                    tag_index: index - 1,
                    value_index: index,
                    value,
                });
            }
            (next, sites)
        },
    );

    sites
}

fn classify(line: &str) -> StateValue {
    if line.contains(EMPTY_STATE) {
        return StateValue::Empty;
    }
    match state_bounds(line) {
        Some((start, end)) => StateValue::Value(line[start..end].to_string()),
        None => StateValue::Missing,
    }
}

/// Byte range of the text between `<state>` and `</state>` on this line.
pub fn state_bounds(line: &str) -> Option<(usize, usize)> {
    let start = line.find(STATE_OPEN)? + STATE_OPEN.len();
    let end = start + line[start..].find(STATE_CLOSE)?;
    Some((start, end))
}

/// `<state>value</state>`; `value` must already be escaped.
pub fn state_element(value: &str) -> String {
    format!("{}{}{}", STATE_OPEN, value, STATE_CLOSE)
}

/// Fills an empty `<state></state>` on `line`, keeping everything around it.
pub fn fill_empty_state(line: &str, value: &str) -> String {
    line.replacen(EMPTY_STATE, &state_element(value), 1)
}

/// Splits text into lines that keep their own terminator, so joining them
/// back with `concat` reproduces the input byte for byte.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_owned).collect()
}

/// Leading whitespace of a line.
pub fn indentation(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// `"\r\n"`, `"\n"` or `""` for an unterminated last line.
pub fn terminator(line: &str) -> &str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

/// Escapes the characters that cannot appear raw in XML element text.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| format!("{}\n", l)).collect()
    }

    #[test]
    fn finds_empty_option_in_debug_linker() {
        let input = lines(&[
            "<name>Debug</name>",
            "<name>ILINK</name>",
            "<name>IlinkAdditionalLibs</name>",
            "<state></state>",
        ]);
        let sites = scan(&input, &Target::default());
        assert_eq!(
            sites,
            vec![OptionSite { tag_index: 2, value_index: 3, value: StateValue::Empty }]
        );
    }

    #[test]
    fn release_configuration_is_ignored() {
        let input = lines(&[
            "<configuration>",
            "    <name>Release</name>",
            "    <settings>",
            "        <name>ILINK</name>",
            "        <name>IlinkAdditionalLibs</name>",
            "        <state></state>",
        ]);
        assert!(scan(&input, &Target::default()).is_empty());
    }

    #[test]
    fn release_ends_debug_context() {
        let input = lines(&[
            "<name>Debug</name>",
            "<name>ILINK</name>",
            "<name>Release</name>",
            "<name>IlinkAdditionalLibs</name>",
            "<state></state>",
        ]);
        assert!(scan(&input, &Target::default()).is_empty());
    }

    #[test]
    fn linker_context_ends_at_next_tool_block() {
        let input = lines(&[
            "<configuration>",
            "  <name>Debug</name>",
            "  <settings>",
            "    <name>ILINK</name>",
            "  </settings>",
            "  <settings>",
            "    <name>BILINK</name>",
            "    <name>IlinkAdditionalLibs</name>",
            "    <state></state>",
        ]);
        assert!(scan(&input, &Target::default()).is_empty());
    }

    #[test]
    fn custom_configuration_after_debug_is_not_patched() {
        let input = lines(&[
            "<configuration>",
            "  <name>Debug</name>",
            "</configuration>",
            "<configuration>",
            "  <name>Flash</name>",
            "  <settings>",
            "    <name>ILINK</name>",
            "    <name>IlinkAdditionalLibs</name>",
            "    <state></state>",
        ]);
        assert!(scan(&input, &Target::default()).is_empty());
    }

    #[test]
    fn tool_tag_outside_configuration_does_not_count() {
        let input = lines(&[
            "<name>ILINK</name>",
            "<name>Debug</name>",
            "<name>IlinkAdditionalLibs</name>",
            "<state></state>",
        ]);
        assert!(scan(&input, &Target::default()).is_empty());
    }

    #[test]
    fn only_the_line_after_the_tag_is_checked() {
        let input = lines(&[
            "<name>Debug</name>",
            "<name>ILINK</name>",
            "<name>IlinkAdditionalLibs</name>",
            "<version>0</version>",
            "<state></state>",
        ]);
        let sites = scan(&input, &Target::default());
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].value, StateValue::Missing);
        assert_eq!(sites[0].value_index, 3);
    }

    #[test]
    fn existing_value_is_reported() {
        let input = vec![
            "<name>Debug</name>\r\n".to_string(),
            "<name>ILINK</name>\r\n".to_string(),
            "  <name>IlinkAdditionalLibs</name>\r\n".to_string(),
            "  <state>$PROJ_DIR$\\lib\\a.a</state>\r\n".to_string(),
        ];
        let sites = scan(&input, &Target::default());
        assert_eq!(sites[0].value, StateValue::Value("$PROJ_DIR$\\lib\\a.a".to_string()));
    }

    #[test]
    fn release_can_be_targeted() {
        let input = lines(&[
            "<name>Debug</name>",
            "<name>ILINK</name>",
            "<name>IlinkAdditionalLibs</name>",
            "<state></state>",
            "<name>Release</name>",
            "<settings>",
            "<name>ILINK</name>",
            "<name>IlinkAdditionalLibs</name>",
            "<state></state>",
        ]);
        let sites = scan(&input, &Target::new("Release"));
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].value_index, 8);
    }

    #[test]
    fn split_lines_keeps_terminators() {
        let text = "a\r\nb\nc";
        let split = split_lines(text);
        assert_eq!(split, vec!["a\r\n", "b\n", "c"]);
        assert_eq!(split.concat(), text);
        assert_eq!(terminator(&split[0]), "\r\n");
        assert_eq!(terminator(&split[2]), "");
    }

    #[test]
    fn fill_keeps_indentation() {
        let line = "                    <state></state>\n";
        assert_eq!(indentation(line).len(), 20);
        assert_eq!(fill_empty_state(line, "x.lib"), "                    <state>x.lib</state>\n");
    }

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape_text(r"C:\R&D\<lib>.a"), r"C:\R&amp;D\&lt;lib&gt;.a");
    }
}
