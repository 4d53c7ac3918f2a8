//! Human-readable texts for transfer and money request notifications.

use super::TransferNotice;
use crate::core_types::TransactionId;
use crate::directory::TransferMethod;
use crate::ledger::TransactionRecord;
use crate::money::Amount;
use crate::money_request::{MoneyRequestAction, MoneyRequestEvent};

const MASK: &str = "••••";
const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━";

/// A rendered notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub title: &'static str,
    pub body: String,
}

/// Keep only the last 4 characters, e.g. `••••1234`
pub fn mask_number(number: &str) -> String {
    let chars: Vec<char> = number.trim().chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("{}{}", MASK, tail)
}

/// First 8 characters of the transaction id
pub fn short_ref(transaction_id: TransactionId) -> String {
    transaction_id.to_string().chars().take(8).collect()
}

fn size_word(amount: Amount) -> &'static str {
    if amount <= Amount::from_units(20) {
        "payment"
    } else if amount >= Amount::from_units(500) {
        "large payment"
    } else {
        "funds"
    }
}

/// How the money travelled, from the sender's or the receiver's side
pub fn describe_method(record: &TransactionRecord, for_sender: bool) -> String {
    match record.transfer_method {
        TransferMethod::Mobile => match (&record.receiver_phone, for_sender) {
            (Some(phone), true) => format!("to mobile number {}", phone),
            _ => "via your registered mobile number".to_string(),
        },
        TransferMethod::Ipa => {
            let address = if for_sender {
                record.receiver_ipa_address.as_deref()
            } else {
                record.sender_ipa_address.as_deref()
            };
            match address {
                Some(a) => format!("via IPA address {}", a),
                None => "via IPA address".to_string(),
            }
        }
        TransferMethod::Iban => match (&record.receiver_iban, for_sender) {
            (Some(iban), true) => format!("to IBAN {}", mask_number(iban)),
            (_, true) => "to IBAN account".to_string(),
            (_, false) => "to your IBAN account".to_string(),
        },
        TransferMethod::Card => match (&record.receiver_card, for_sender) {
            (Some(card), true) => format!("to card ending in {}", mask_number(card)),
            (_, true) => "to card account".to_string(),
            (_, false) => "to your card".to_string(),
        },
        TransferMethod::Account => {
            let (word, key) = if for_sender {
                ("to", &record.receiver_account)
            } else {
                ("from", &record.sender_account)
            };
            format!(
                "{} account {} (Bank ID: {})",
                word,
                mask_number(&key.account_number),
                key.bank_id
            )
        }
    }
}

fn details(record: &TransactionRecord, party_label: &str, party: &str) -> String {
    format!(
        "DETAILS\n\
         • Amount: {cur} {amount}\n\
         • {label}: {party}\n\
         • Method: {method}\n\
         • Date: {date}\n\
         • Reference: #{reference}\n",
        cur = record.currency,
        amount = record.amount.format_grouped(),
        label = party_label,
        party = party,
        method = record.transfer_method,
        date = record.transaction_time.format("%d %b %Y, %I:%M %p"),
        reference = short_ref(record.transaction_id),
    )
}

fn balance_line(currency: &str, balance: Option<Amount>) -> String {
    match balance {
        Some(b) => format!("BALANCE UPDATE\nYour new balance is {} {}\n", currency, b.format_grouped()),
        None => String::new(),
    }
}

/// Text for the paying user
pub fn payment_sent(notice: &TransferNotice) -> Message {
    let r = &notice.record;
    let receiver = r.receiver_name.as_deref().unwrap_or("the recipient");
    let body = format!(
        "{rule}\nYou've successfully sent {what} worth {cur} {amount} to {receiver} {how}.\n\n{details}{rule}\n{balance}",
        rule = RULE,
        what = size_word(r.amount),
        cur = r.currency,
        amount = r.amount.format_grouped(),
        receiver = receiver,
        how = describe_method(r, true),
        details = details(r, "To", receiver),
        balance = balance_line(&r.currency, notice.sender_balance),
    );
    Message {
        title: "PAYMENT SENT",
        body,
    }
}

/// Text for the receiving user
pub fn payment_received(notice: &TransferNotice) -> Message {
    let r = &notice.record;
    let body = format!(
        "{rule}\nYou've received {what} worth {cur} {amount} from {sender} {how}.\n\n{details}{rule}\n{balance}",
        rule = RULE,
        what = size_word(r.amount),
        cur = r.currency,
        amount = r.amount.format_grouped(),
        sender = r.sender_name,
        how = describe_method(r, false),
        details = details(r, "From", &r.sender_name),
        balance = balance_line(&r.currency, notice.receiver_balance),
    );
    Message {
        title: "PAYMENT RECEIVED",
        body,
    }
}

pub fn money_request(event: &MoneyRequestEvent, currency: &str) -> Message {
    let req = &event.request;
    let amount = req.amount.format_grouped();
    let (title, body) = match event.action {
        MoneyRequestAction::Created => (
            "MONEY REQUEST",
            format!(
                "{} is requesting {} {} from you{}",
                req.requester_name,
                currency,
                amount,
                req.message
                    .as_deref()
                    .map(|m| format!(": \"{}\"", m))
                    .unwrap_or_default()
            ),
        ),
        MoneyRequestAction::Accepted => (
            "MONEY REQUEST ACCEPTED",
            format!(
                "{} accepted your request for {} {}",
                req.requested_name, currency, amount
            ),
        ),
        MoneyRequestAction::Declined => (
            "MONEY REQUEST DECLINED",
            format!(
                "{} declined your request for {} {}",
                req.requested_name, currency, amount
            ),
        ),
        MoneyRequestAction::Expired => (
            "MONEY REQUEST EXPIRED",
            format!(
                "Your request to {} for {} {} has expired",
                req.requested_name, currency, amount
            ),
        ),
    };
    Message { title, body }
}
