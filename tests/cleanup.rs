mod common;

use cleanmail::engine::delete_senders_session;
use cleanmail::{aggregate, delete_by_sender, EngineError, NoProgress, SenderKey};
use common::{small_batches, FakeMailbox};

#[tokio::test]
async fn one_vanished_message_does_not_fail_the_call() {
    let mailbox = FakeMailbox::new();
    let mut uids = Vec::new();
    for _ in 0..5 {
        uids.push(mailbox.add("Promo <promo@shop.example>"));
    }
    mailbox.add("friend@home.example");
    mailbox
        .state
        .lock()
        .unwrap()
        .vanish_before_store
        .insert(uids[2]);

    let mut session = mailbox.session(&small_batches());
    let result = delete_by_sender(&mut session, &SenderKey::parse("promo@shop.example"))
        .await
        .expect("deletion returns a result");

    assert_eq!(result.removed, 4);
    assert_eq!(result.failed(), 1);
    assert_eq!(result.failures[0].uid, uids[2]);
    assert!(result.clone().ensure_complete().is_err());
    assert_eq!(mailbox.len(), 1);
}

#[tokio::test]
async fn rescan_after_delete_no_longer_reports_sender() {
    let mailbox = FakeMailbox::new();
    for _ in 0..3 {
        mailbox.add("Promo <promo@shop.example>");
    }
    mailbox.add("friend@home.example");

    let mut session = mailbox.session(&small_batches());
    let before = aggregate(&mut session, NoProgress).await.expect("scan");
    let promo = SenderKey::parse("promo@shop.example");
    assert_eq!(before.get(&promo).map(|s| s.count), Some(3));

    let result = delete_by_sender(&mut session, &promo).await.expect("delete");
    assert_eq!(result.removed, 3);
    assert!(result.is_complete());

    let after = aggregate(&mut session, NoProgress).await.expect("rescan");
    assert!(after.get(&promo).is_none());
    assert_eq!(after.fetched, 1);
    // The old snapshot is untouched; callers discard it themselves.
    assert_eq!(before.get(&promo).map(|s| s.count), Some(3));
}

#[tokio::test]
async fn substring_search_matches_are_left_alone() {
    let mailbox = FakeMailbox::new();
    mailbox.add("bob@x.com");
    mailbox.add("jimbob@x.com");
    mailbox.add("Bob <BOB@X.COM>");

    let mut session = mailbox.session(&small_batches());
    let result = delete_by_sender(&mut session, &SenderKey::parse("bob@x.com"))
        .await
        .expect("delete");

    assert_eq!(result.removed, 2);
    assert!(result.is_complete());
    let remaining = mailbox.state.lock().unwrap().live_senders();
    assert_eq!(remaining, vec![Some("jimbob@x.com".to_string())]);
}

#[tokio::test]
async fn connection_drop_reports_partial_progress() {
    let mailbox = FakeMailbox::new();
    for _ in 0..5 {
        mailbox.add("promo@shop.example");
    }
    mailbox.state.lock().unwrap().drop_on_store = Some(2);

    let mut session = mailbox.session(&small_batches());
    let err = delete_by_sender(&mut session, &SenderKey::parse("promo@shop.example"))
        .await
        .expect_err("connection dropped");

    assert!(err.is_connectivity());
    let partial = err.partial_deletion().expect("partial result attached");
    assert_eq!(partial.removed, 2);
    match &err {
        EngineError::DeletionInterrupted { source, .. } => {
            assert!(matches!(**source, EngineError::Connectivity(_)))
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // The first batch stays deleted.
    assert_eq!(mailbox.len(), 3);
}

#[tokio::test]
async fn rejected_expunge_is_recorded_per_message() {
    let mailbox = FakeMailbox::new();
    for _ in 0..3 {
        mailbox.add("promo@shop.example");
    }
    mailbox.state.lock().unwrap().reject_expunge = true;

    let mut session = mailbox.session(&small_batches());
    let result = delete_by_sender(&mut session, &SenderKey::parse("promo@shop.example"))
        .await
        .expect("rejections are not fatal");

    assert_eq!(result.removed, 0);
    assert_eq!(result.failed(), 3);
    assert!(result.failures.iter().all(|f| f.reason.contains("read-only")));
    assert_eq!(mailbox.len(), 3);
}

#[tokio::test]
async fn expunge_that_removes_nothing_is_not_counted() {
    let mailbox = FakeMailbox::new();
    for _ in 0..3 {
        mailbox.add("promo@shop.example");
    }
    mailbox.state.lock().unwrap().expunge_noop = true;

    let mut session = mailbox.session(&small_batches());
    let result = delete_by_sender(&mut session, &SenderKey::parse("promo@shop.example"))
        .await
        .expect("short expunge is not fatal");

    assert_eq!(result.removed, 0);
    assert_eq!(result.failed(), 3);
    assert!(result
        .failures
        .iter()
        .all(|f| f.reason.contains("still in mailbox")));
    assert_eq!(mailbox.len(), 3);
}

#[tokio::test]
async fn unknown_sender_cannot_be_deleted() {
    let mailbox = FakeMailbox::new();
    mailbox.add_message(None, None);

    let mut session = mailbox.session(&small_batches());
    let err = delete_by_sender(&mut session, &SenderKey::unknown())
        .await
        .expect_err("sentinel is not deletable");

    assert!(matches!(err, EngineError::InvalidSender(_)));
    assert_eq!(mailbox.len(), 1);
}

#[tokio::test]
async fn no_matches_is_an_empty_result() {
    let mailbox = FakeMailbox::new();
    mailbox.add("friend@home.example");

    let mut session = mailbox.session(&small_batches());
    let result = delete_by_sender(&mut session, &SenderKey::parse("nobody@x.com"))
        .await
        .expect("delete");

    assert_eq!(result.removed, 0);
    assert!(result.is_complete());
}

#[tokio::test]
async fn several_senders_share_one_session() {
    let mailbox = FakeMailbox::new();
    mailbox.add("a@x.com");
    mailbox.add("b@y.com");
    mailbox.add("b@y.com");
    mailbox.add("keep@z.com");

    let session = mailbox.session(&small_batches());
    let senders = [SenderKey::parse("a@x.com"), SenderKey::parse("b@y.com")];
    let (results, outcome) = delete_senders_session(session, &senders).await;

    outcome.expect("all senders handled");
    let removed: Vec<u64> = results.iter().map(|r| r.removed).collect();
    assert_eq!(removed, vec![1, 2]);
    assert_eq!(mailbox.len(), 1);
    assert_eq!(mailbox.logouts(), 1);
}

#[tokio::test]
async fn failing_sender_stops_the_run_and_still_logs_out() {
    let mailbox = FakeMailbox::new();
    mailbox.add("a@x.com");
    mailbox.add("b@y.com");
    mailbox.state.lock().unwrap().drop_on_store = Some(1);

    let session = mailbox.session(&small_batches());
    let senders = [SenderKey::parse("a@x.com"), SenderKey::parse("b@y.com")];
    let (results, outcome) = delete_senders_session(session, &senders).await;

    assert!(results.is_empty());
    assert!(outcome.expect_err("dropped").is_connectivity());
    assert_eq!(mailbox.len(), 2);
    assert_eq!(mailbox.logouts(), 1);
}
