//! Autocorrection: applies a conflict-free subset of proposed edits
//!
//! Edits are sorted by start offset (ties keep discovery order). An edit
//! that touches or overlaps the last accepted edit loses and its issue is
//! marked `unresolved-conflict`. Accepted edits are applied right to left so
//! earlier offsets stay valid.

use crate::diagnostic::{Issue, IssueStatus};
use std::ops::Range;

/// A proposed text replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Byte range in the text the edit was computed against
    pub range: Range<usize>,
    /// Replacement text
    pub replacement: String,
}

impl Edit {
    /// Replace a range
    pub fn replace(range: Range<usize>, replacement: impl Into<String>) -> Self {
        Self {
            range,
            replacement: replacement.into(),
        }
    }

    /// Delete a range
    pub fn delete(range: Range<usize>) -> Self {
        Self::replace(range, "")
    }

    /// Whether this edit's range touches or intersects `other`
    pub fn touches(&self, other: &Range<usize>) -> bool {
        self.range.start <= other.end && other.start <= self.range.end
    }
}

/// An edit together with the index of the issue it fixes
#[derive(Debug, Clone)]
pub struct Proposal {
    /// Index into the pass's issue list (also its discovery order)
    pub issue: usize,
    pub edit: Edit,
}

/// Outcome of one correction step
#[derive(Debug, Default)]
pub struct Correction {
    /// Text after applying the accepted edits
    pub text: String,
    /// Issues whose edits were applied, in position order
    pub accepted: Vec<usize>,
    /// Issues whose edits lost a conflict
    pub conflicts: Vec<usize>,
    /// Issues whose edits were malformed, with the reason
    pub invalid: Vec<(usize, String)>,
}

impl Correction {
    /// Whether any edit was applied
    pub fn is_changed(&self) -> bool {
        !self.accepted.is_empty()
    }
}

/// Applies proposals to a text and updates issue statuses
pub struct Corrector;

impl Corrector {
    /// Apply the non-conflicting subset of `proposals` to `text`.
    ///
    /// Statuses in `issues` are updated in place: accepted issues become
    /// `corrected` and losers become `unresolved-conflict`. Malformed edits
    /// leave their issue untouched and are listed in `invalid`.
    pub fn apply(text: &str, issues: &mut [Issue], proposals: Vec<Proposal>) -> Correction {
        let mut correction = Correction::default();

        let mut candidates = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            match validate(text, issues.get(proposal.issue), &proposal.edit) {
                Ok(()) => candidates.push(proposal),
                Err(reason) => correction.invalid.push((proposal.issue, reason)),
            }
        }

        // Stable sort: equal offsets keep discovery order
        candidates.sort_by(|a, b| {
            a.edit
                .range
                .start
                .cmp(&b.edit.range.start)
                .then(a.issue.cmp(&b.issue))
        });

        let mut accepted: Vec<Proposal> = Vec::new();
        for candidate in candidates {
            let conflicts = accepted
                .last()
                .is_some_and(|last| candidate.edit.touches(&last.edit.range));
            if conflicts {
                log::trace!(
                    "edit {:?} for issue {} conflicts with an earlier edit",
                    candidate.edit.range,
                    candidate.issue
                );
                correction.conflicts.push(candidate.issue);
            } else {
                accepted.push(candidate);
            }
        }

        let mut output = text.to_string();
        for proposal in accepted.iter().rev() {
            output.replace_range(proposal.edit.range.clone(), &proposal.edit.replacement);
        }

        for &index in &correction.conflicts {
            issues[index].status = IssueStatus::UnresolvedConflict;
        }
        for proposal in &accepted {
            issues[proposal.issue].status = IssueStatus::Corrected;
        }

        correction.accepted = accepted.into_iter().map(|p| p.issue).collect();
        correction.text = output;
        correction
    }
}

fn validate(text: &str, issue: Option<&Issue>, edit: &Edit) -> Result<(), String> {
    let issue = issue.ok_or_else(|| "edit refers to an unknown issue".to_string())?;
    let range = &edit.range;

    if range.start > range.end || range.end > text.len() {
        return Err(format!("edit range {:?} is outside the text", range));
    }
    if !text.is_char_boundary(range.start) || !text.is_char_boundary(range.end) {
        return Err(format!(
            "edit range {:?} splits a UTF-8 character",
            range
        ));
    }
    let bounds = &issue.location.offsets;
    if range.start < bounds.start || range.end > bounds.end {
        return Err(format!(
            "edit range {:?} exceeds issue range {:?}",
            range, bounds
        ));
    }
    Ok(())
}
