//! Markdown rendering of the release notes draft.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use crate::config::{ReleaseNotesConfig, SectionConfig};
use crate::errors::ReleaseNotesError;
use crate::release::reconcile::MergeRequestRecord;

/// Everything the draft mentions.
#[derive(Debug, Clone)]
pub struct ReleaseNotes {
    pub date: NaiveDate,
    pub project: String,
    pub project_fullname: String,
    pub previous: String,
    pub version: String,
    /// Pre-rendered dependency lines (see [`dependency_line`](super::stack::dependency_line)).
    pub dependencies: Vec<String>,
    pub merge_requests: Vec<MergeRequestRecord>,
    /// Upstream MRs worth repeating, already filtered by label.
    pub highlights: Vec<MergeRequestRecord>,
}

/// Resolve the output path pattern (`{repo}`, `{target}`).
pub fn output_path(pattern: &str, repo: &Path, target: &str) -> PathBuf {
    PathBuf::from(
        pattern
            .replace("{repo}", &repo.to_string_lossy())
            .replace("{target}", target),
    )
}

/// Write `content` to `path`, refusing to overwrite an existing file.
pub fn write_notes(path: &Path, content: &str) -> Result<(), ReleaseNotesError> {
    if path.exists() {
        return Err(ReleaseNotesError::OutputExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(content.as_bytes())?;
    info!(path = %path.display(), "release notes draft written");
    Ok(())
}

/// MRs not in `used` matching any of `label_sets` (case-insensitive subset
/// test). Matches are added to `used`.
pub fn select_mrs<'a>(
    mrs: &'a [MergeRequestRecord],
    label_sets: &[Vec<String>],
    used: &mut BTreeSet<u64>,
) -> Vec<&'a MergeRequestRecord> {
    let label_sets: Vec<BTreeSet<String>> = label_sets
        .iter()
        .map(|set| set.iter().map(|l| l.to_lowercase()).collect())
        .collect();
    let mut matches = Vec::new();
    for mr in mrs {
        if used.contains(&mr.id) {
            continue;
        }
        let labels: BTreeSet<String> = mr.labels.iter().map(|l| l.to_lowercase()).collect();
        if label_sets.iter().any(|set| set.is_subset(&labels)) {
            used.insert(mr.id);
            matches.push(mr);
        }
    }
    matches
}

/// Stable sort by the positions, in `label_order`, of the labels an MR
/// carries. MRs with none of them go last.
pub fn order_by_label<'a>(
    mut mrs: Vec<&'a MergeRequestRecord>,
    label_order: &[String],
) -> Vec<&'a MergeRequestRecord> {
    let order: Vec<String> = label_order.iter().map(|l| l.to_lowercase()).collect();
    mrs.sort_by_cached_key(|mr| {
        let key: Vec<usize> = order
            .iter()
            .enumerate()
            .filter(|(_, label)| mr.has_label(label))
            .map(|(i, _)| i)
            .collect();
        if key.is_empty() {
            vec![order.len()]
        } else {
            key
        }
    });
    mrs
}

/// GitLab markdown reference to a label.
pub fn label_ref(label: &str) -> String {
    if label.contains(' ') {
        format!("~\"{}\"", label)
    } else {
        format!("~{}", label)
    }
}

/// Capitalize the first character.
pub fn sentence(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl ReleaseNotes {
    /// Render the draft.
    pub fn render(&self, config: &ReleaseNotesConfig) -> String {
        let hidden = hidden_labels(config);
        let mut out = String::new();

        out.push_str(&format!("{} {} {}\n", self.date, self.project, self.version));
        out.push_str("===\n\n");

        if !self.dependencies.is_empty() {
            out.push_str("This version uses\n");
            out.push_str(&self.dependencies.join(",\n"));
            out.push_str(".\n\n");
        }

        out.push_str("This version is released on `master` branch.\n");
        out.push_str(&format!(
            "Built relative to {project} [{prev}](../-/tags/{prev}), with the following changes:\n",
            project = self.project,
            prev = self.previous
        ));

        let mut used = BTreeSet::new();
        for section in &config.sections {
            self.render_section(&mut out, section, &mut used, config, &hidden);
        }

        if !self.highlights.is_empty() {
            out.push_str("\n### Highlights from upstream projects\n\n");
            let refs: Vec<&MergeRequestRecord> = self.highlights.iter().collect();
            for mr in order_by_label(refs, &config.label_order) {
                out.push_str(&self.entry_line(mr, &hidden));
                out.push('\n');
            }
        }
        out
    }

    fn render_section(
        &self,
        out: &mut String,
        section: &SectionConfig,
        used: &mut BTreeSet<u64>,
        config: &ReleaseNotesConfig,
        hidden: &BTreeSet<String>,
    ) {
        let selected = select_mrs(&self.merge_requests, &section.labels, used);
        if selected.is_empty() {
            return;
        }
        out.push_str(&format!("\n### {}\n\n", section.title));
        for mr in order_by_label(selected, &config.label_order) {
            out.push_str(&self.entry_line(mr, hidden));
            out.push('\n');
        }
    }

    /// `- ~Label | Title, !42 (@author) [refs]`
    pub fn entry_line(&self, mr: &MergeRequestRecord, hidden: &BTreeSet<String>) -> String {
        let labels: Vec<String> = mr
            .labels
            .iter()
            .filter(|l| !hidden.contains(&l.to_lowercase()))
            .map(|l| label_ref(l))
            .collect();
        let mut line = String::from("- ");
        if !labels.is_empty() {
            line.push_str(&labels.join(" "));
            line.push_str(" | ");
        }
        line.push_str(&format!(
            "{}, {} (@{})",
            sentence(mr.title.trim()),
            mr.reference_from(&self.project_fullname),
            mr.author
        ));
        if !mr.issue_refs.is_empty() {
            line.push_str(&format!(" [{}]", mr.issue_refs.join(",")));
        }
        line
    }
}

/// Labels that only drive section selection or highlighting, lowercased.
pub fn hidden_labels(config: &ReleaseNotesConfig) -> BTreeSet<String> {
    config
        .sections
        .iter()
        .flat_map(|s| s.labels.iter().flatten())
        .chain(std::iter::once(&config.highlight_label))
        .map(|l| l.to_lowercase())
        .collect()
}
