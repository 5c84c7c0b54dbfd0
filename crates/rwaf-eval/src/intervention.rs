//! The pending disruptive decision for a transaction.
//!
//! Disruptive actions write into a per-rule [`Intervention`] in declaration
//! order, so within one rule the last write wins. When the rule finishes, the
//! engine merges that pending record into the transaction's intervention by
//! [`InterventionKind`] precedence:
//!
//! `Drop > Deny > Redirect > Status > None`
//!
//! A pending record replaces the current one only if its kind ranks at least
//! as high. A deny therefore survives every later status-only rule, while a
//! later deny replaces an earlier one.

use serde::Serialize;

/// Status used when no `status` action was given.
pub const DEFAULT_STATUS: u16 = 200;
/// Status for `deny` / `drop` without an explicit `status`.
pub const DEFAULT_DENY_STATUS: u16 = 403;
/// Status for `redirect` without an explicit redirect `status`.
pub const DEFAULT_REDIRECT_STATUS: u16 = 302;

const REDIRECT_STATUSES: [u16; 4] = [301, 302, 303, 307];

/// Kind of outcome, ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    None,
    /// A status code without blocking (`status` alone).
    Status,
    Redirect,
    Deny,
    Drop,
}

impl InterventionKind {
    pub fn is_disruptive(self) -> bool {
        matches!(
            self,
            InterventionKind::Redirect | InterventionKind::Deny | InterventionKind::Drop
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Intervention {
    pub kind: InterventionKind,
    pub status: u16,
    /// Redirect target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Log line of the rule that set this intervention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    pub disruptive: bool,
    /// Requested delay before the response, in milliseconds.
    pub pause_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip)]
    status_set: bool,
}

impl Intervention {
    pub fn new() -> Self {
        Intervention {
            kind: InterventionKind::None,
            status: DEFAULT_STATUS,
            url: None,
            log: None,
            disruptive: false,
            pause_ms: 0,
            rule_id: None,
            status_set: false,
        }
    }

    /// Whether nothing has been requested.
    pub fn is_empty(&self) -> bool {
        self.kind == InterventionKind::None && self.pause_ms == 0
    }

    // -------------------------------------------------------------------------
    // Writers used by disruptive actions
    // -------------------------------------------------------------------------

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
        self.status_set = true;
        if self.kind == InterventionKind::None {
            self.kind = InterventionKind::Status;
        }
    }

    pub fn set_deny(&mut self) {
        self.kind = InterventionKind::Deny;
        self.url = None;
    }

    pub fn set_drop(&mut self) {
        self.kind = InterventionKind::Drop;
        self.url = None;
    }

    pub fn set_redirect(&mut self, url: String) {
        self.kind = InterventionKind::Redirect;
        self.url = Some(url);
    }

    /// `pass`: discard any disruption requested earlier in the rule.
    pub fn clear_disruption(&mut self) {
        self.kind = InterventionKind::None;
        self.url = None;
        self.status = DEFAULT_STATUS;
        self.status_set = false;
    }

    pub fn set_pause(&mut self, ms: u64) {
        self.pause_ms = ms;
    }

    /// Settle the status code and disruptive flag once a rule's actions
    /// have all run.
    pub fn finalize(&mut self) {
        match self.kind {
            InterventionKind::Deny | InterventionKind::Drop if !self.status_set => {
                self.status = DEFAULT_DENY_STATUS;
            }
            InterventionKind::Redirect if !REDIRECT_STATUSES.contains(&self.status) => {
                self.status = DEFAULT_REDIRECT_STATUS;
            }
            InterventionKind::None => {
                self.status = DEFAULT_STATUS;
            }
            _ => {}
        }
        self.disruptive = self.kind.is_disruptive();
    }

    /// Merge a finalized per-rule record into this one. Returns `true` when
    /// `pending` took over.
    pub fn merge(&mut self, pending: Intervention) -> bool {
        if pending.is_empty() {
            return false;
        }
        let pause_ms = self.pause_ms.max(pending.pause_ms);
        let replaced = pending.kind >= self.kind;
        if replaced {
            *self = pending;
        }
        self.pause_ms = pause_ms;
        replaced
    }
}

impl Default for Intervention {
    fn default() -> Self {
        Self::new()
    }
}
