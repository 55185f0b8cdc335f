use std::sync::Arc;

use mailmart_bot::{Bot, BotConfig, ConversationState};
use mailmart_db::Database;
use mailmart_types::events::{Inbound, Keyboard, Outgoing};
use mailmart_types::models::{ReviewAction, Role, SubmissionKind, SubmissionStatus};

const ADMIN: i64 = 1;
const SELLER: i64 = 2;

fn bot() -> (Bot, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let bot = Bot::new(
        db.clone(),
        BotConfig {
            admin_id: ADMIN,
            channel_link: Some("https://t.me/example".into()),
            max_credit: None,
        },
    );
    (bot, db)
}

async fn say(bot: &Bot, user: i64, text: &str) -> Vec<Outgoing> {
    bot.handle(Inbound::text(user, text)).await
}

fn texts_to(out: &[Outgoing], chat_id: i64) -> Vec<&str> {
    out.iter()
        .filter(|m| m.chat_id == chat_id)
        .map(|m| m.text.as_str())
        .collect()
}

#[tokio::test]
async fn start_registers_and_promotes_admin() {
    let (bot, db) = bot();

    let out = bot.handle(Inbound::command(SELLER, "start", None)).await;
    assert!(out[0].text.contains("https://t.me/example"));
    assert_eq!(db.get_user(SELLER).unwrap().unwrap().role, Role::User);

    bot.handle(Inbound::command(ADMIN, "start", None)).await;
    assert_eq!(db.get_user(ADMIN).unwrap().unwrap().role, Role::Admin);
}

#[tokio::test]
async fn start_with_referral_credits_referrer() {
    let (bot, db) = bot();
    bot.handle(Inbound::command(SELLER, "start", None)).await;
    bot.handle(Inbound::command(3, "start", Some(SELLER.to_string()))).await;
    // Repeated /start must not count twice.
    bot.handle(Inbound::command(3, "start", Some(SELLER.to_string()))).await;

    assert_eq!(db.get_user(SELLER).unwrap().unwrap().referral_count, 1);
    assert_eq!(db.get_user(3).unwrap().unwrap().referred_by, Some(SELLER));
}

#[tokio::test]
async fn admin_bulk_add_reports_malformed_lines() {
    let (bot, db) = bot();

    say(&bot, ADMIN, "Add inventory").await;
    assert_eq!(bot.state_of(ADMIN).await, ConversationState::AddingInventory);

    let out = say(&bot, ADMIN, "a@x.com:pw\nbadline\nb@x.com:pw2").await;
    let texts = texts_to(&out, ADMIN);
    assert!(texts.iter().any(|t| t.contains("1 malformed") && t.contains("badline")));
    assert!(texts.last().unwrap().contains("Added 2"));

    assert_eq!(db.inventory_counts().unwrap().available, 2);
    assert_eq!(bot.state_of(ADMIN).await, ConversationState::Idle);
}

#[tokio::test]
async fn duplicate_stock_is_reported_per_line() {
    let (bot, db) = bot();
    db.add_inventory("a@x.com", "pw").unwrap();

    say(&bot, ADMIN, "Add inventory").await;
    let out = say(&bot, ADMIN, "a@x.com:other\nc@x.com:pw").await;
    let texts = texts_to(&out, ADMIN);
    assert!(texts.iter().any(|t| t.starts_with("Already stocked") && t.contains("a@x.com")));
    assert!(texts.last().unwrap().contains("Added 1"));
}

#[tokio::test]
async fn regular_user_cannot_add_inventory() {
    let (bot, _db) = bot();
    let out = say(&bot, SELLER, "Add inventory").await;
    assert!(out[0].text.contains("admins only"));
    assert_eq!(bot.state_of(SELLER).await, ConversationState::Idle);
}

#[tokio::test]
async fn sell_count_reprompts_then_reports_shortfall() {
    let (bot, db) = bot();
    db.add_inventory("only@x.com", "pw").unwrap();

    say(&bot, SELLER, "Sell accounts").await;
    assert_eq!(bot.state_of(SELLER).await, ConversationState::ChoosingSellMethod);
    say(&bot, SELLER, "Inventory accounts").await;

    for bad in ["0", "6", "many"] {
        let out = say(&bot, SELLER, bad).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].text.contains("Try again"));
        assert_eq!(bot.state_of(SELLER).await, ConversationState::EnteringSellCount);
    }

    let out = say(&bot, SELLER, "3").await;
    assert_eq!(out.len(), 2);
    assert!(out[0].text.contains("only provide 1 of the 3"));
    assert!(out[1].text.contains("only@x.com:pw"));
    assert!(matches!(out[1].keyboard, Some(Keyboard::OneTime(_))));

    assert_eq!(db.inventory_counts().unwrap().sold, 1);
    assert_eq!(db.recent_sales_to(SELLER, 5).unwrap().len(), 1);
    assert_eq!(bot.state_of(SELLER).await, ConversationState::Idle);
}

#[tokio::test]
async fn selling_with_no_stock_ends_flow() {
    let (bot, _db) = bot();
    say(&bot, SELLER, "Sell accounts").await;
    say(&bot, SELLER, "Inventory accounts").await;

    let out = say(&bot, SELLER, "2").await;
    assert!(out[0].text.contains("no inventory accounts are available"));
    assert_eq!(bot.state_of(SELLER).await, ConversationState::Idle);
}

#[tokio::test]
async fn cancel_discards_partial_flow() {
    let (bot, db) = bot();
    db.add_inventory("a@x.com", "pw").unwrap();

    say(&bot, SELLER, "Sell accounts").await;
    say(&bot, SELLER, "Inventory accounts").await;
    let out = bot.handle(Inbound::command(SELLER, "cancel", None)).await;
    assert!(out[0].text.starts_with("Cancelled the sale"));
    assert_eq!(bot.state_of(SELLER).await, ConversationState::Idle);
    assert_eq!(db.inventory_counts().unwrap().available, 1);

    let out = bot.handle(Inbound::command(SELLER, "cancel", None)).await;
    assert!(out[0].text.contains("nothing to cancel"));
}

#[tokio::test]
async fn cancel_while_adding_inventory_stocks_nothing() {
    let (bot, db) = bot();

    say(&bot, ADMIN, "Add inventory").await;
    let out = bot.handle(Inbound::command(ADMIN, "cancel", None)).await;
    assert!(out[0].text.starts_with("Cancelled adding inventory"));
    assert_eq!(bot.state_of(ADMIN).await, ConversationState::Idle);

    // The batch now lands in the main menu, not the inventory.
    say(&bot, ADMIN, "a@x.com:pw").await;
    assert_eq!(db.inventory_counts().unwrap().total, 0);
}

#[tokio::test]
async fn cancel_before_delete_keeps_the_account() {
    let (bot, db) = bot();
    db.add_inventory("a@x.com", "pw").unwrap();

    say(&bot, ADMIN, "Manage inventory").await;
    say(&bot, ADMIN, "Delete account").await;
    assert_eq!(bot.state_of(ADMIN).await, ConversationState::EnteringDeleteTarget);

    let out = bot.handle(Inbound::command(ADMIN, "cancel", None)).await;
    assert!(out[0].text.starts_with("Cancelled inventory management"));
    assert_eq!(bot.state_of(ADMIN).await, ConversationState::Idle);

    say(&bot, ADMIN, "a@x.com").await;
    assert_eq!(db.inventory_counts().unwrap().available, 1);
}

#[tokio::test]
async fn cancel_during_approval_credits_nothing() {
    let (bot, db) = bot();
    let id = db.submit(SELLER, "s@x.com", "pw", SubmissionKind::SelfSourced).unwrap();

    bot.handle(Inbound::callback(ADMIN, ReviewAction::Accept(id).callback_data()))
        .await;
    let out = bot.handle(Inbound::command(ADMIN, "cancel", None)).await;
    assert!(out[0].text.starts_with("Cancelled the review"));
    assert_eq!(bot.state_of(ADMIN).await, ConversationState::Idle);

    // A late amount is just unrecognised menu input.
    let out = say(&bot, ADMIN, "100").await;
    assert!(texts_to(&out, SELLER).is_empty());

    let row = db.get_submission(id).unwrap().unwrap();
    assert_eq!(row.status, SubmissionStatus::Pending);
    assert_eq!(db.get_user(SELLER).unwrap().map(|u| u.balance).unwrap_or(0), 0);
}

/// Make any insert into `table` with credential 'boom' fail.
fn fail_on_boom(db: &Database, table: &str) {
    db.with_conn(|conn| {
        conn.execute_batch(&format!(
            "CREATE TRIGGER fail_boom_{table} BEFORE INSERT ON {table}
             WHEN NEW.credential = 'boom'
             BEGIN SELECT RAISE(ABORT, 'refused'); END;"
        ))?;
        Ok(())
    })
    .unwrap();
}

#[tokio::test]
async fn failed_submission_batch_saves_nothing() {
    let (bot, db) = bot();
    fail_on_boom(&db, "submissions");

    say(&bot, SELLER, "Submit accounts").await;
    say(&bot, SELLER, "Self-sourced (your own)").await;
    let out = say(&bot, SELLER, "good@x.com:pw\nboom:pw").await;

    assert!(texts_to(&out, SELLER)[0].contains("something went wrong"));
    assert!(texts_to(&out, ADMIN).is_empty());
    assert!(db.pending_submissions().unwrap().is_empty());
    assert_eq!(bot.state_of(SELLER).await, ConversationState::Idle);

    // Retrying leaves exactly one pending row.
    say(&bot, SELLER, "Submit accounts").await;
    say(&bot, SELLER, "Self-sourced (your own)").await;
    let out = say(&bot, SELLER, "good@x.com:pw").await;
    assert_eq!(texts_to(&out, ADMIN).len(), 1);
    assert_eq!(db.pending_submissions().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_inventory_batch_stocks_nothing() {
    let (bot, db) = bot();
    fail_on_boom(&db, "inventory");

    say(&bot, ADMIN, "Add inventory").await;
    let out = say(&bot, ADMIN, "good@x.com:pw\nboom:pw").await;

    assert!(out[0].text.contains("something went wrong"));
    assert_eq!(db.inventory_counts().unwrap().total, 0);
    assert_eq!(bot.state_of(ADMIN).await, ConversationState::Idle);
}

#[tokio::test]
async fn invalid_menu_choice_returns_to_idle() {
    let (bot, _db) = bot();
    say(&bot, SELLER, "Submit accounts").await;
    assert_eq!(bot.state_of(SELLER).await, ConversationState::ChoosingSubmitMethod);

    let out = say(&bot, SELLER, "something else").await;
    assert!(out[0].text.starts_with("Invalid choice"));
    assert_eq!(bot.state_of(SELLER).await, ConversationState::Idle);
}

#[tokio::test]
async fn submission_notifies_admin_with_recent_purchases() {
    let (bot, db) = bot();
    db.add_inventory("bought@x.com", "pw").unwrap();
    db.allocate(SELLER, 1).unwrap();

    say(&bot, SELLER, "Submit accounts").await;
    say(&bot, SELLER, "From inventory (bought here)").await;
    assert_eq!(
        bot.state_of(SELLER).await,
        ConversationState::EnteringSubmission {
            kind: SubmissionKind::Inventory
        }
    );

    let out = say(&bot, SELLER, "bought@x.com:pw\nnope").await;
    let to_seller = texts_to(&out, SELLER);
    assert!(to_seller.iter().any(|t| t.contains("malformed")));
    assert!(to_seller.iter().any(|t| t.contains("Sent 1 account(s)")));

    let to_admin = texts_to(&out, ADMIN);
    assert_eq!(to_admin.len(), 1);
    assert!(to_admin[0].contains("from inventory"));
    assert!(to_admin[0].contains("Last 1 inventory accounts sold"));

    let pending = db.pending_submissions().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, SubmissionKind::Inventory);
}

#[tokio::test]
async fn approval_credits_once_and_notifies_seller() {
    let (bot, db) = bot();
    let id = db.submit(SELLER, "s@x.com", "pw", SubmissionKind::SelfSourced).unwrap();

    let out = say(&bot, ADMIN, "Review submissions").await;
    assert!(out.iter().any(|m| matches!(m.keyboard, Some(Keyboard::Inline(_)))));

    let accept = ReviewAction::Accept(id).callback_data();
    bot.handle(Inbound::callback(ADMIN, accept.clone())).await;
    assert!(matches!(
        bot.state_of(ADMIN).await,
        ConversationState::EnteringApprovalAmount { submission_id, .. } if submission_id == id
    ));

    let out = say(&bot, ADMIN, "lots").await;
    assert!(out[0].text.contains("Enter the amount again"));

    let out = say(&bot, ADMIN, "150").await;
    let to_seller = texts_to(&out, SELLER);
    assert_eq!(to_seller.len(), 1);
    assert!(to_seller[0].contains("Current balance: 150"));
    assert_eq!(db.get_user(SELLER).unwrap().unwrap().balance, 150);

    // The stale button cannot credit a second time.
    let out = bot.handle(Inbound::callback(ADMIN, accept)).await;
    assert!(out[0].text.contains("already handled"));
    assert_eq!(bot.state_of(ADMIN).await, ConversationState::Idle);
    assert_eq!(db.get_user(SELLER).unwrap().unwrap().balance, 150);
}

#[tokio::test]
async fn decision_already_taken_elsewhere_is_not_credited() {
    let (bot, db) = bot();
    let id = db.submit(SELLER, "s@x.com", "pw", SubmissionKind::SelfSourced).unwrap();

    bot.handle(Inbound::callback(ADMIN, ReviewAction::Accept(id).callback_data()))
        .await;
    db.decide(id, &mailmart_db::models::Decision::Reject { reason: "dup".into() })
        .unwrap();

    let out = say(&bot, ADMIN, "100").await;
    assert!(out[0].text.contains("Nothing was credited"));
    assert_eq!(db.get_user(SELLER).map(|u| u.map(|u| u.balance)).unwrap().unwrap_or(0), 0);
}

#[tokio::test]
async fn rejection_records_reason_and_offers_resubmit() {
    let (bot, db) = bot();
    let id = db.submit(SELLER, "s@x.com", "pw", SubmissionKind::Inventory).unwrap();

    bot.handle(Inbound::callback(ADMIN, ReviewAction::Reject(id).callback_data()))
        .await;
    let out = say(&bot, ADMIN, "   ").await;
    assert!(out[0].text.contains("enter a reason"));

    let out = say(&bot, ADMIN, "password changed").await;
    let to_seller: Vec<_> = out.iter().filter(|m| m.chat_id == SELLER).collect();
    assert_eq!(to_seller.len(), 1);
    assert!(to_seller[0].text.contains("Reason: password changed"));
    assert!(matches!(to_seller[0].keyboard, Some(Keyboard::OneTime(_))));

    let row = db.get_submission(id).unwrap().unwrap();
    assert_eq!(row.status, SubmissionStatus::Rejected);

    say(&bot, SELLER, "Resubmit as self-sourced").await;
    assert_eq!(
        bot.state_of(SELLER).await,
        ConversationState::EnteringSubmission {
            kind: SubmissionKind::SelfSourced
        }
    );
}

#[tokio::test]
async fn review_buttons_require_admin() {
    let (bot, db) = bot();
    let id = db.submit(SELLER, "s@x.com", "pw", SubmissionKind::Inventory).unwrap();

    let out = bot
        .handle(Inbound::callback(SELLER, ReviewAction::Accept(id).callback_data()))
        .await;
    assert!(out[0].text.contains("admins only"));
    assert_eq!(bot.state_of(SELLER).await, ConversationState::Idle);
}

#[tokio::test]
async fn delete_then_delete_again() {
    let (bot, db) = bot();
    db.add_inventory("a@x.com", "pw1").unwrap();

    let out = say(&bot, ADMIN, "Manage inventory").await;
    assert!(out[0].text.contains("available: 1"));
    say(&bot, ADMIN, "Delete account").await;
    let out = say(&bot, ADMIN, "a@x.com").await;
    assert!(out[0].text.starts_with("Deleted a@x.com"));

    say(&bot, ADMIN, "Manage inventory").await;
    say(&bot, ADMIN, "Delete account").await;
    let out = say(&bot, ADMIN, "a@x.com").await;
    assert!(out[0].text.contains("was not found"));
    assert_eq!(db.inventory_counts().unwrap().total, 0);
}

#[tokio::test]
async fn balance_and_stats() {
    let (bot, db) = bot();
    bot.handle(Inbound::command(SELLER, "start", None)).await;
    let id = db.submit(SELLER, "s@x.com", "pw", SubmissionKind::Inventory).unwrap();
    db.decide(id, &mailmart_db::models::Decision::Approve { credit: 40 })
        .unwrap();

    let out = say(&bot, SELLER, "Balance").await;
    assert!(out[0].text.contains("Your balance: 40"));

    let out = say(&bot, ADMIN, "Bot stats").await;
    assert!(out[0].text.contains("Total bot users: 2"));
    assert!(out[0].text.contains("Submissions awaiting review: 0"));
}

#[tokio::test]
async fn startup_promotes_admin_and_greets() {
    let (bot, db) = bot();
    let out = bot.startup().await.unwrap();
    assert_eq!(out[0].chat_id, ADMIN);
    assert_eq!(db.get_user(ADMIN).unwrap().unwrap().role, Role::Admin);
}
