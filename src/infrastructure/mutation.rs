//! Entry mutation orchestrator
//!
//! Turns an edited attribute map into directory operations. A changed
//! naming attribute becomes a modify-DN first; every other changed attribute
//! becomes a `replace` against the resulting DN.

use super::directory::{DirectoryService, RenameRequest};
use crate::domain::dn;
use crate::domain::{
    find_attribute, Attributes, ConnectionContext, DirectoryEntry, PendingMutation, SearchRequest,
};
use crate::error::{AppError, AppResult};
use serde::Serialize;

/// Progress of one edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationPhase {
    Idle,
    Renaming,
    Modifying,
    Done,
    Failed,
}

/// Result of a successfully applied edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    /// DN of the entry after the edit
    pub dn: String,
    pub renamed: bool,
    /// Attributes sent as replace modifications
    pub modified: Vec<String>,
    pub phase: MutationPhase,
}

/// The entry being edited and where the edit currently stands
struct EntryMutation {
    dn: String,
    phase: MutationPhase,
}

impl EntryMutation {
    fn new(dn: &str) -> Self {
        Self {
            dn: dn.to_string(),
            phase: MutationPhase::Idle,
        }
    }

    fn enter(&mut self, phase: MutationPhase) {
        tracing::debug!(dn = %self.dn, from = ?self.phase, to = ?phase, "Entry mutation phase");
        self.phase = phase;
    }
}

fn cleaned_values(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// New value of the naming attribute if the edit changes it.
fn new_naming_value(original_dn: &str, edited: &Attributes) -> Option<String> {
    let (attr, raw) = dn::split_rdn(dn::first_rdn(original_dn));
    if attr.is_empty() {
        return None;
    }
    let old_value = dn::unescape_value(raw);
    let (_, edited_value) = find_attribute(edited, attr)?;
    let new_value = cleaned_values(edited_value.values()).into_iter().next()?;

    (new_value != old_value).then_some(new_value)
}

/// New RDN for `original_dn` if the edit changes its naming attribute's value.
///
/// The attribute name is kept as written in the DN and the new value is
/// escaped. Other assertions of a multi-valued RDN are carried over. A
/// missing or blank naming attribute in the edit is not a change.
pub fn naming_change(original_dn: &str, edited: &Attributes) -> Option<String> {
    new_naming_value(original_dn, edited)
        .map(|value| dn::replace_naming_value(dn::first_rdn(original_dn), &value))
}

/// Values the naming attribute holds once the rename (if any) went through:
/// the old RDN value is dropped and the new one added.
fn naming_values_after_rename(original: &DirectoryEntry, renamed_to: Option<&str>) -> Vec<String> {
    let naming_attr = dn::naming_attribute(&original.dn);
    let mut values = original.get(&naming_attr).map(|v| v.values()).unwrap_or_default();
    if let Some(new_value) = renamed_to {
        let old_value = dn::naming_value(&original.dn);
        values.retain(|v| v != &old_value);
        if !values.iter().any(|v| v == new_value) {
            values.push(new_value.to_string());
        }
    }
    values
}

fn same_set(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|v| b.contains(v))
}

/// Replace modifications for every attribute the edit changed, except `dn`.
///
/// The naming attribute is compared with what the server holds after the
/// rename, so extra values next to the RDN value are still written.
/// Attributes absent from the edit are left alone; an attribute edited down
/// to no values is replaced with nothing, which removes it.
pub fn replace_mutations(original: &DirectoryEntry, edited: &Attributes) -> Vec<PendingMutation> {
    let naming_attr = dn::naming_attribute(&original.dn);
    let renamed_to = new_naming_value(&original.dn, edited);
    let naming_after = naming_values_after_rename(original, renamed_to.as_deref());

    edited
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("dn"))
        .filter_map(|(name, value)| {
            let values = cleaned_values(value.values());
            if name.eq_ignore_ascii_case(&naming_attr) {
                // a blank naming attribute keeps the RDN value
                return (!values.is_empty() && !same_set(&values, &naming_after))
                    .then(|| PendingMutation::replace(name.clone(), values));
            }
            match original.get(name) {
                Some(existing) if existing.values() == values => None,
                None if values.is_empty() => None,
                _ => Some(PendingMutation::replace(name.clone(), values)),
            }
        })
        .collect()
}

/// Current server state of `target`, the baseline an edit is compared to.
pub async fn load_entry<D>(dir: &D, ctx: &ConnectionContext, target: &str) -> AppResult<DirectoryEntry>
where
    D: DirectoryService + ?Sized,
{
    dn::validate_dn(target)?;
    dir.search(ctx, &SearchRequest::base(target))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NoSuchObject(target.to_string()))
}

/// Apply `edited` to `original`: rename first when the naming value changed,
/// then one modify with the remaining changes.
///
/// A failed rename aborts with the rename's error and nothing changed. A
/// failed modify after a successful rename is `PartiallyApplied`.
pub async fn apply_entry_edit<D>(
    dir: &D,
    ctx: &ConnectionContext,
    original: &DirectoryEntry,
    edited: &Attributes,
) -> AppResult<MutationOutcome>
where
    D: DirectoryService + ?Sized,
{
    let rename = naming_change(&original.dn, edited).map(RenameRequest::new);
    run_edit(dir, ctx, original, edited, rename).await
}

/// Apply `edited` so the entry ends up named by `attribute`.
///
/// An entry already named by `attribute` is edited like any other. One named
/// by something else is renamed to `attribute=<edited value>` with its old
/// RDN value kept, and the remaining changes go to the new DN.
pub async fn apply_edit_named_by<D>(
    dir: &D,
    ctx: &ConnectionContext,
    original: &DirectoryEntry,
    attribute: &str,
    edited: &Attributes,
) -> AppResult<MutationOutcome>
where
    D: DirectoryService + ?Sized,
{
    if dn::naming_attribute(&original.dn) == attribute.to_ascii_lowercase() {
        return apply_entry_edit(dir, ctx, original, edited).await;
    }
    let value = find_attribute(edited, attribute)
        .and_then(|(_, v)| cleaned_values(v.values()).into_iter().next())
        .ok_or_else(|| AppError::Malformed(format!("{} is required", attribute)))?;

    let mut rename = RenameRequest::new(dn::make_rdn(attribute, &value));
    rename.delete_old_rdn = false;
    run_edit(dir, ctx, original, edited, Some(rename)).await
}

async fn run_edit<D>(
    dir: &D,
    ctx: &ConnectionContext,
    original: &DirectoryEntry,
    edited: &Attributes,
    rename: Option<RenameRequest>,
) -> AppResult<MutationOutcome>
where
    D: DirectoryService + ?Sized,
{
    dn::validate_dn(&original.dn)?;
    let mut state = EntryMutation::new(&original.dn);
    let mut renamed = false;

    if let Some(request) = rename {
        state.enter(MutationPhase::Renaming);
        if let Err(e) = dir.rename(ctx, &state.dn, &request).await {
            state.enter(MutationPhase::Failed);
            return Err(e);
        }
        state.dn = dn::with_first_rdn(&state.dn, &request.new_rdn);
        renamed = true;
        tracing::info!(from = %original.dn, to = %state.dn, "Entry renamed");
    }

    let changes = replace_mutations(original, edited);
    if !changes.is_empty() {
        state.enter(MutationPhase::Modifying);
        if let Err(e) = dir.modify(ctx, &state.dn, &changes).await {
            state.enter(MutationPhase::Failed);
            if renamed {
                tracing::warn!(dn = %state.dn, error = %e, "Rename applied but modify failed");
                return Err(AppError::PartiallyApplied {
                    dn: state.dn,
                    message: e.to_string(),
                });
            }
            return Err(e);
        }
    }

    state.enter(MutationPhase::Done);
    Ok(MutationOutcome {
        dn: state.dn,
        renamed,
        modified: changes.into_iter().map(|c| c.attribute).collect(),
        phase: state.phase,
    })
}
