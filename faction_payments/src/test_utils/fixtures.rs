use faction_api::NewsEntry;
use faction_common::Money;

use crate::db_types::NewPaymentRequest;

/// News text for `depositor` paying `amount` into `recipient`'s faction balance, as the upstream API renders it.
pub fn deposit_text(depositor: (i64, &str), recipient: (i64, &str), amount: Money) -> String {
    let link = |(id, name): (i64, &str)| format!(r#"<a href = "http://www.torn.com/profiles.php?XID={id}">{name}</a>"#);
    let amount = amount.to_string();
    format!("{} increased {}'s money balance by {amount} from $0 to {amount}", link(depositor), link(recipient))
}

pub fn deposit_news(id: &str, recipient_id: i64, amount: i64, timestamp: i64) -> NewsEntry {
    NewsEntry {
        id: id.to_string(),
        text: deposit_text((1, "Banker"), (recipient_id, &format!("member{recipient_id}")), Money::from(amount)),
        timestamp,
    }
}

pub fn new_request(request_id: &str, faction_id: i64, user_id: i64, value: i64) -> NewPaymentRequest {
    NewPaymentRequest::new(request_id, faction_id, user_id, &format!("member{user_id}"), "Lockpick", Money::from(value))
}
