use chrono::DateTime;
use faction_api::NewsEntry;
use faction_common::Money;
use log::*;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::db_types::DepositEvidence;

/// `<depositor link> increased <recipient link>'s money balance by $<amount>`, optionally followed by the
/// before/after balances. Both links carry the player id as `XID=<id>` and the player name as the link text.
static DEPOSIT_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(concat!(
        r"<a[^>]*XID=([0-9]+)[^>]*>([^<]*)</a> increased ",
        r"<a[^>]*XID=([0-9]+)[^>]*>([^<]*)</a>'s money balance by \$([0-9,]+)",
    ))
    .map_err(|e| error!("📰️ Deposit pattern failed to compile. No deposits will be recognised. {e}"))
    .ok()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDeposit {
    pub depositor_id: i64,
    pub depositor_name: String,
    pub recipient_id: i64,
    pub recipient_name: String,
    pub amount: Money,
}

/// Extracts the parties and amount from the text of a deposit news item.
///
/// Returns `None` for anything that is not a well-formed deposit: other news, empty player names, ids or amounts
/// that do not fit in an `i64`.
pub fn parse_deposit_text(text: &str) -> Option<ParsedDeposit> {
    let pattern = DEPOSIT_PATTERN.as_ref()?;
    let Some(captures) = pattern.captures(text) else {
        debug!("📰️ Not a deposit: {text}");
        return None;
    };
    let field = |i: usize| captures.get(i).map(|m| m.as_str()).unwrap_or_default();
    let depositor_name = field(2).trim();
    let recipient_name = field(4).trim();
    if depositor_name.is_empty() || recipient_name.is_empty() {
        debug!("📰️ Deposit text is missing a player name: {text}");
        return None;
    }
    let depositor_id = field(1).parse::<i64>().ok();
    let recipient_id = field(3).parse::<i64>().ok();
    let amount = field(5).parse::<Money>().ok();
    match (depositor_id, recipient_id, amount) {
        (Some(depositor_id), Some(recipient_id), Some(amount)) => Some(ParsedDeposit {
            depositor_id,
            depositor_name: depositor_name.to_string(),
            recipient_id,
            recipient_name: recipient_name.to_string(),
            amount,
        }),
        _ => {
            debug!("📰️ Deposit text has an id or amount out of range: {text}");
            None
        },
    }
}

impl DepositEvidence {
    pub fn from_news(entry: &NewsEntry) -> Option<Self> {
        let deposit = parse_deposit_text(&entry.text)?;
        let timestamp = DateTime::from_timestamp(entry.timestamp, 0)?;
        Some(Self {
            news_id: entry.id.clone(),
            recipient_id: deposit.recipient_id,
            recipient_name: deposit.recipient_name,
            depositor_id: deposit.depositor_id,
            depositor_name: deposit.depositor_name,
            amount: deposit.amount,
            timestamp,
        })
    }
}

/// Parses every deposit in `entries`, keeping feed order and silently dropping everything else.
pub fn parse_deposits(entries: &[NewsEntry]) -> Vec<DepositEvidence> {
    entries.iter().filter_map(DepositEvidence::from_news).collect()
}
