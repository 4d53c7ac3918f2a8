//! End-to-end send-money behaviour against the in-memory store.

mod common;

use common::*;
use std::sync::Arc;

use transfer_core::config::TransferConfig;
use transfer_core::core_types::IdempotencyKey;
use transfer_core::credentials::AuthContext;
use transfer_core::directory::{FundingSource, Recipient, TransferMethod};
use transfer_core::error::{ErrorCategory, TransferError};
use transfer_core::models::AccountStatus;
use transfer_core::money::Amount;
use transfer_core::policy::SettingsPatch;
use transfer_core::service::PaymentCore;
use transfer_core::store::Stores;
use transfer_core::transfer::SendMoney;

#[tokio::test]
async fn scenario_ipa_transfer_moves_money_and_records_one_row() {
    let h = Harness::new().await;

    let receipt = h
        .core
        .send_money(send(USER_A, to_ipa("b@bank"), units(300), PIN_A))
        .await
        .unwrap();

    assert_eq!(receipt.status, "completed");
    assert!(!receipt.replayed);
    assert_eq!(h.store.balance(&acct_a()).await, Some(units(700)));
    assert_eq!(h.store.balance(&acct_b()).await, Some(units(500)));
    assert_eq!(h.store.transaction_count().await, 1);

    let history = h.core.transactions_for_user(USER_A, None).await.unwrap();
    assert_eq!(history.len(), 1);
    let row = &history[0];
    assert_eq!(row.transaction_id, receipt.transaction_id);
    assert_eq!(row.amount, units(300));
    assert_eq!(row.transfer_method, TransferMethod::Ipa);
    assert_eq!(row.sender_name, "Amr Saleh");
    assert_eq!(row.receiver_user_id, Some(USER_B));
    assert_eq!(row.receiver_name.as_deref(), Some("Mona Fahmy"));
    assert_eq!(row.sender_ipa_address.as_deref(), Some("a@bank"));
    assert_eq!(row.receiver_ipa_address.as_deref(), Some("b@bank"));
    assert_eq!(row.currency, "EGP");

    let notices = h.notifier.wait_for_transfers(1).await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].sender_balance, Some(units(700)));
    assert_eq!(notices[0].receiver_balance, Some(units(500)));
    assert_eq!(
        notices[0].receiver.as_ref().map(|u| u.user_id),
        Some(USER_B)
    );
}

#[tokio::test]
async fn every_addressing_scheme_reaches_the_same_account() {
    let h = Harness::new().await;

    let recipients = [
        (to_ipa("b@bank"), TransferMethod::Ipa),
        (
            Recipient::Mobile {
                phone: PHONE_B.into(),
            },
            TransferMethod::Mobile,
        ),
        (
            Recipient::Card {
                bank_id: 2,
                card_number: CARD_B.into(),
            },
            TransferMethod::Card,
        ),
        (Recipient::Account(acct_b()), TransferMethod::Account),
        (
            Recipient::Iban {
                iban: IBAN_B.into(),
            },
            TransferMethod::Iban,
        ),
    ];

    for (recipient, method) in recipients {
        assert_eq!(h.core.resolve(&recipient).await.unwrap(), acct_b());
        let receipt = h
            .core
            .send_money(send(USER_A, recipient, units(10), PIN_A))
            .await
            .unwrap();
        let row = h
            .core
            .transaction(USER_A, receipt.transaction_id)
            .await
            .unwrap();
        assert_eq!(row.transfer_method, method);
        assert_eq!(row.receiver_account, acct_b());
    }

    assert_eq!(h.store.balance(&acct_a()).await, Some(units(950)));
    assert_eq!(h.store.balance(&acct_b()).await, Some(units(250)));

    // the method-specific receiver field is the identifier that was used
    let history = h.core.transactions_for_user(USER_B, None).await.unwrap();
    let by_method = |m: TransferMethod| history.iter().find(|r| r.transfer_method == m).unwrap();
    assert_eq!(by_method(TransferMethod::Mobile).receiver_phone.as_deref(), Some(PHONE_B));
    assert_eq!(by_method(TransferMethod::Card).receiver_card.as_deref(), Some(CARD_B));
    assert_eq!(by_method(TransferMethod::Iban).receiver_iban.as_deref(), Some(IBAN_B));
    assert_eq!(by_method(TransferMethod::Account).receiver_ipa_address, None);
}

#[tokio::test]
async fn unknown_recipient_is_distinguishable() {
    let h = Harness::new().await;

    let err = h
        .core
        .send_money(send(USER_A, to_ipa("nobody@bank"), units(10), PIN_A))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RECIPIENT_NOT_FOUND");
    assert_eq!(err.category(), ErrorCategory::RecipientNotFound);

    let err = h
        .core
        .send_money(send(
            USER_A,
            Recipient::Mobile {
                phone: "0199".into(),
            },
            units(10),
            PIN_A,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RECIPIENT_NOT_FOUND");
    assert_eq!(h.store.transaction_count().await, 0);
}

#[tokio::test]
async fn self_transfer_rejected_whatever_the_scheme() {
    let h = Harness::new().await;

    for recipient in [
        to_ipa("a@bank"),
        Recipient::Iban {
            iban: IBAN_A.into(),
        },
        Recipient::Account(acct_a()),
    ] {
        let err = h
            .core
            .send_money(send(USER_A, recipient, units(10), PIN_A))
            .await
            .unwrap_err();
        assert_eq!(err, TransferError::SelfTransfer);
    }
    assert_eq!(h.store.balance(&acct_a()).await, Some(units(1000)));
    assert_eq!(h.store.transaction_count().await, 0);
}

#[tokio::test]
async fn blocked_transactions_win_before_pin_is_checked() {
    let h = Harness::with_verifier(Arc::new(NeverCalledVerifier)).await;
    h.core
        .update_settings(
            &SettingsPatch {
                transactions_blocked: Some(true),
                block_message: Some("Scheduled maintenance until 02:00".into()),
                ..Default::default()
            },
            Some(99),
        )
        .await
        .unwrap();

    // wrong PIN, zero amount, unknown recipient: still blocked
    for cmd in [
        send(USER_A, to_ipa("b@bank"), units(10), "0000"),
        send(USER_A, to_ipa("b@bank"), Amount::ZERO, PIN_A),
        send(USER_A, to_ipa("ghost@bank"), units(10), PIN_A),
    ] {
        let err = h.core.send_money(cmd).await.unwrap_err();
        assert_eq!(err.code(), "TRANSACTIONS_BLOCKED");
        assert_eq!(err.to_string(), "Scheduled maintenance until 02:00");
        assert_eq!(err.http_status(), 403);
    }

    let status = h.core.public_status().await.unwrap();
    assert!(!status.transactions_enabled);
    assert_eq!(
        status.message.as_deref(),
        Some("Scheduled maintenance until 02:00")
    );
    assert_eq!(h.core.settings().await.unwrap().updated_by, Some(99));
}

#[tokio::test]
async fn transfer_limit_applies_only_when_enabled() {
    let h = Harness::new().await;
    h.core
        .update_settings(
            &SettingsPatch {
                transfer_limit_amount: Some(units(100)),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    // limit set but disabled
    h.core
        .send_money(send(USER_A, to_ipa("b@bank"), units(150), PIN_A))
        .await
        .unwrap();

    h.core
        .update_settings(
            &SettingsPatch {
                transfer_limit_enabled: Some(true),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    let err = h
        .core
        .send_money(send(USER_A, to_ipa("b@bank"), units(150), PIN_A))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TRANSFER_LIMIT_EXCEEDED");
    assert_eq!(err.to_body().limit, Some(units(100)));
    assert_eq!(
        err.to_string(),
        "Transfer amount exceeds the maximum limit of 100.00"
    );

    // the limit itself is allowed
    h.core
        .send_money(send(USER_A, to_ipa("b@bank"), units(100), PIN_A))
        .await
        .unwrap();
    assert_eq!(
        h.core.public_status().await.unwrap().transfer_limit,
        Some(units(100))
    );
}

#[tokio::test]
async fn wrong_or_blank_pin_moves_nothing() {
    let h = Harness::new().await;

    for pin in ["9999", "", "   ", PIN_B] {
        let err = h
            .core
            .send_money(send(USER_A, to_ipa("b@bank"), units(10), pin))
            .await
            .unwrap_err();
        assert_eq!(err, TransferError::InvalidPin);
        assert_eq!(err.category(), ErrorCategory::AuthenticationError);
    }
    assert_eq!(h.store.balance(&acct_a()).await, Some(units(1000)));
    assert_eq!(h.store.transaction_count().await, 0);
}

#[tokio::test]
async fn pin_is_checked_once_against_the_senders_context() {
    let store = seed().await;
    let counting = Arc::new(CountingVerifier::new(hashed_verifier(&store)));
    let core = PaymentCore::new(
        Stores::from_shared(store.clone()),
        counting.clone(),
        Arc::new(RecordingNotifier::default()),
        &TransferConfig::default(),
    );

    core.send_money(send(USER_A, to_ipa("b@bank"), units(10), PIN_A))
        .await
        .unwrap();

    assert_eq!(
        counting.calls(),
        vec![AuthContext::Ipa {
            address: "a@bank".into()
        }]
    );
}

#[tokio::test]
async fn insufficient_funds_and_bad_amounts() {
    let h = Harness::new().await;

    let err = h
        .core
        .send_money(send(USER_A, to_ipa("b@bank"), Amount::from_minor(100_001), PIN_A))
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::InsufficientFunds);

    let err = h
        .core
        .send_money(send(USER_A, to_ipa("b@bank"), Amount::ZERO, PIN_A))
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::InvalidAmount);

    // the whole balance can go
    h.core
        .send_money(send(USER_A, to_ipa("b@bank"), units(1000), PIN_A))
        .await
        .unwrap();
    assert_eq!(h.store.balance(&acct_a()).await, Some(Amount::ZERO));
}

#[tokio::test]
async fn inactive_receiver_rejected() {
    let h = Harness::new().await;
    h.store
        .set_account_status(&acct_b(), AccountStatus::Inactive)
        .await;

    let err = h
        .core
        .send_money(send(USER_A, to_ipa("b@bank"), units(10), PIN_A))
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::AccountInactive(acct_b()));
    assert_eq!(h.store.balance(&acct_a()).await, Some(units(1000)));
}

#[tokio::test]
async fn retry_with_same_key_returns_original_result() {
    let h = Harness::new().await;
    let key = IdempotencyKey::new("client-retry-42").unwrap();

    let mut cmd = send(USER_A, to_ipa("b@bank"), units(300), PIN_A);
    cmd.idempotency_key = Some(key.clone());

    let first = h.core.send_money(cmd.clone()).await.unwrap();
    let second = h.core.send_money(cmd).await.unwrap();

    assert_eq!(first.transaction_id, second.transaction_id);
    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(h.store.transaction_count().await, 1);
    assert_eq!(h.store.balance(&acct_a()).await, Some(units(700)));

    // only the committing attempt notifies
    h.notifier.wait_for_transfers(1).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(h.notifier.transfers().len(), 1);

    // same key, different transfer
    let mut other = send(USER_A, to_ipa("b@bank"), units(1), PIN_A);
    other.idempotency_key = Some(key);
    let err = h.core.send_money(other).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn keys_are_scoped_to_the_sender() {
    let h = Harness::new().await;
    let key = IdempotencyKey::new("retry-1").unwrap();

    let mut from_a = send(USER_A, to_ipa("b@bank"), units(50), PIN_A);
    from_a.idempotency_key = Some(key.clone());
    let mut from_b = send(USER_B, to_ipa("a@bank"), units(20), PIN_B);
    from_b.idempotency_key = Some(key);

    let a = h.core.send_money(from_a).await.unwrap();
    let b = h.core.send_money(from_b).await.unwrap();

    assert!(!a.replayed);
    assert!(!b.replayed);
    assert_ne!(a.transaction_id, b.transaction_id);
    assert_eq!(h.store.transaction_count().await, 2);
    assert_eq!(h.store.balance(&acct_a()).await, Some(units(970)));
    assert_eq!(h.store.balance(&acct_b()).await, Some(units(230)));
}

#[tokio::test]
async fn money_request_key_prefix_is_not_for_callers() {
    let body = |key: &str| {
        format!(
            r#"{{"transfer_method":"ipa","address":"b@bank","amount":"50.00","pin":"1234","idempotency_key":"{}"}}"#,
            key
        )
    };
    assert!(serde_json::from_str::<SendMoney>(&body("request-1")).is_ok());
    assert!(serde_json::from_str::<SendMoney>(&body("money-request:1")).is_err());
    assert!(IdempotencyKey::new("money-request:1").is_err());
}

#[tokio::test]
async fn crash_between_debit_and_credit_leaves_no_trace() {
    let store = seed().await;
    let mut stores = Stores::from_shared(store.clone());
    stores.ledger = Arc::new(CrashAfterDebit::new(store.clone()));
    let faulty = PaymentCore::with_hashed_pins(
        stores,
        Arc::new(RecordingNotifier::default()),
        &TransferConfig::default(),
    );

    let mut cmd = send(USER_A, to_ipa("b@bank"), units(300), PIN_A);
    cmd.idempotency_key = Some(IdempotencyKey::new("crash-1").unwrap());

    let err = faulty.send_money(cmd.clone()).await.unwrap_err();
    assert_eq!(err.code(), "SYSTEM_ERROR");
    assert_eq!(store.balance(&acct_a()).await, Some(units(1000)));
    assert_eq!(store.balance(&acct_b()).await, Some(units(200)));
    assert_eq!(store.transaction_count().await, 0);

    // rerun on a healthy ledger executes once
    let healthy = PaymentCore::with_hashed_pins(
        Stores::from_shared(store.clone()),
        Arc::new(RecordingNotifier::default()),
        &TransferConfig::default(),
    );
    let receipt = healthy.send_money(cmd).await.unwrap();
    assert!(!receipt.replayed);
    assert_eq!(store.balance(&acct_a()).await, Some(units(700)));
    assert_eq!(store.transaction_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_debits_never_overdraw() {
    let h = Arc::new(Harness::new().await);

    // 1000.00 / 300.00 -> exactly 3 can succeed
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let h = h.clone();
            tokio::spawn(async move {
                h.core
                    .send_money(send(USER_A, to_ipa("b@bank"), units(300), PIN_A))
                    .await
            })
        })
        .collect();

    let mut ok = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(TransferError::InsufficientFunds) => insufficient += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(ok, 3);
    assert_eq!(insufficient, 5);
    assert_eq!(h.store.balance(&acct_a()).await, Some(units(100)));
    assert_eq!(h.store.balance(&acct_b()).await, Some(units(1100)));
    assert_eq!(h.store.transaction_count().await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_direction_transfers_conserve_money() {
    let h = Arc::new(Harness::new().await);
    let before = h.store.total_balance().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                h.core
                    .send_money(send(USER_A, to_ipa("b@bank"), units(5), PIN_A))
                    .await
            } else {
                h.core
                    .send_money(send(USER_B, to_ipa("a@bank"), units(5), PIN_B))
                    .await
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(h.store.total_balance().await.unwrap(), before);
    assert_eq!(h.store.balance(&acct_a()).await, Some(units(1000)));
    assert_eq!(h.store.balance(&acct_b()).await, Some(units(200)));
}

#[tokio::test]
async fn notification_failure_is_not_the_transfers_problem() {
    let store = seed().await;
    let failing = Arc::new(FailingNotifier::new());
    let core = PaymentCore::with_hashed_pins(
        Stores::from_shared(store.clone()),
        failing.clone(),
        &TransferConfig::default(),
    );

    let receipt = core
        .send_money(send(USER_A, to_ipa("b@bank"), units(10), PIN_A))
        .await
        .unwrap();
    assert_eq!(receipt.status, "completed");
    assert_eq!(store.balance(&acct_b()).await, Some(units(210)));
}

#[tokio::test]
async fn funding_source_selection() {
    let h = Harness::new().await;

    // explicit account, PIN of the IPA linked to it
    let mut cmd = send(USER_A, to_ipa("b@bank"), units(10), PIN_A);
    cmd.source = Some(FundingSource::Account(acct_a()));
    h.core.send_money(cmd).await.unwrap();

    // card, checked against the card PIN
    let mut cmd = send(USER_A, to_ipa("b@bank"), units(10), CARD_PIN_A);
    cmd.source = Some(FundingSource::Card {
        bank_id: 1,
        card_number: CARD_A.into(),
    });
    let receipt = h.core.send_money(cmd).await.unwrap();
    let row = h
        .core
        .transaction(USER_A, receipt.transaction_id)
        .await
        .unwrap();
    assert_eq!(row.sender_account, acct_a());
    assert_eq!(row.sender_ipa_address, None);

    let mut cmd = send(USER_A, to_ipa("b@bank"), units(10), PIN_A);
    cmd.source = Some(FundingSource::Card {
        bank_id: 1,
        card_number: CARD_A.into(),
    });
    assert_eq!(
        h.core.send_money(cmd).await.unwrap_err(),
        TransferError::InvalidPin
    );

    // somebody else's IPA or account
    let mut cmd = send(USER_A, to_ipa("b@bank"), units(10), PIN_B);
    cmd.source = Some(FundingSource::Ipa {
        address: "b@bank".into(),
    });
    assert_eq!(h.core.send_money(cmd).await.unwrap_err().code(), "FORBIDDEN");

    let mut cmd = send(USER_A, to_ipa("b@bank"), units(10), PIN_A);
    cmd.source = Some(FundingSource::Account(acct_b()));
    assert_eq!(h.core.send_money(cmd).await.unwrap_err().code(), "FORBIDDEN");

    assert_eq!(h.store.balance(&acct_a()).await, Some(units(980)));
}

#[tokio::test]
async fn history_is_newest_first_and_private() {
    let h = Harness::new().await;

    let first = h
        .core
        .send_money(send(USER_A, to_ipa("b@bank"), units(1), PIN_A))
        .await
        .unwrap();
    let second = h
        .core
        .send_money(send(USER_B, to_ipa("a@bank"), units(2), PIN_B))
        .await
        .unwrap();

    let history = h.core.transactions_for_user(USER_B, Some(10)).await.unwrap();
    let ids: Vec<_> = history.iter().map(|r| r.transaction_id).collect();
    assert_eq!(ids, vec![second.transaction_id, first.transaction_id]);

    let limited = h.core.transactions_for_user(USER_B, Some(0)).await.unwrap();
    assert_eq!(limited.len(), 1);

    let err = h.core.transaction(3, first.transaction_id).await.unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
}
