use std::sync::Arc;

use tracing::{debug, error, info, warn};

use mailmart_db::Database;
use mailmart_db::models::{AddOutcome, DecideOutcome, Decision, InventoryRow};
use mailmart_types::events::{Inbound, InboundPayload, Keyboard, Outgoing};
use mailmart_types::models::{ReviewAction, Role, SubmissionKind, UserId};

use crate::error::BotError;
use crate::keyboards::{self, Button};
use crate::parse;
use crate::session::{ConversationState, SessionStore};

const GENERIC_FAILURE: &str =
    "Sorry, something went wrong while handling your request. Please try again later.";
const NOT_UNDERSTOOD: &str = "I didn't understand that. Please pick an option from the menu.";
const COMING_SOON: &str = "This feature is under development. Please check back later.";
const ADMINS_ONLY: &str = "Sorry, this section is for admins only.";
const USERS_ONLY: &str = "Sorry, this section is for regular users only.";
const BACK_AT_MENU: &str = "Back at the main menu.";
const FORMAT_HINT: &str = "Use the format credential:secret, one per line.";

/// How many of a seller's recent purchases the admin sees next to a submission.
const RECENT_SALES_SHOWN: u32 = 5;

type Replies = Result<Vec<Outgoing>, BotError>;

#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Identity granted the admin role on first contact and at startup.
    pub admin_id: UserId,
    /// Channel advertised in the user welcome message.
    pub channel_link: Option<String>,
    /// Ceiling on a single approval credit. `None` trusts the admin's figure.
    pub max_credit: Option<i64>,
}

pub struct Bot {
    db: Arc<Database>,
    sessions: SessionStore,
    config: BotConfig,
}

impl Bot {
    pub fn new(db: Arc<Database>, config: BotConfig) -> Self {
        Self {
            db,
            sessions: SessionStore::new(),
            config,
        }
    }

    pub async fn state_of(&self, user_id: UserId) -> ConversationState {
        self.sessions.get(user_id).await
    }

    /// Grant the configured admin its role and greet it.
    pub async fn startup(&self) -> Replies {
        let admin_id = self.config.admin_id;
        self.store(move |db| db.promote_admin(admin_id)).await?;
        Ok(vec![
            Outgoing::new(admin_id, "Ready to serve. 🚀").with_keyboard(keyboards::admin_menu()),
        ])
    }

    /// Process one inbound event. Store failures end the user's flow with a
    /// generic apology; they never escape as errors.
    pub async fn handle(&self, inbound: Inbound) -> Vec<Outgoing> {
        let user_id = inbound.user_id;
        match self.dispatch(&inbound).await {
            Ok(replies) => replies,
            Err(e) => {
                error!("Failed to handle update from user {}: {}", user_id, e);
                let abandoned = self.sessions.clear(user_id).await;
                if abandoned != ConversationState::Idle {
                    warn!("User {} dropped out of {}", user_id, abandoned.activity());
                }
                let role = if user_id == self.config.admin_id {
                    Role::Admin
                } else {
                    Role::User
                };
                vec![reply(user_id, GENERIC_FAILURE, role)]
            }
        }
    }

    async fn dispatch(&self, inbound: &Inbound) -> Replies {
        let user_id = inbound.user_id;
        match &inbound.payload {
            InboundPayload::Command { name, args } => match name.trim_start_matches('/') {
                "start" => self.start(inbound, args.as_deref()).await,
                "cancel" => self.cancel(user_id).await,
                other => {
                    let role = self.touch(user_id, None).await?;
                    Ok(vec![reply(user_id, format!("Unknown command /{}.", other), role)])
                }
            },
            InboundPayload::Callback(data) => self.review_callback(user_id, data).await,
            InboundPayload::Text(text) => {
                let role = self.touch(user_id, None).await?;
                let state = self.sessions.get(user_id).await;
                debug!("User {} sent text in state {:?}", user_id, state);

                match state {
                    ConversationState::Idle => self.main_menu_choice(user_id, role, text).await,
                    ConversationState::AddingInventory => {
                        self.receive_inventory(user_id, text).await
                    }
                    ConversationState::ManagingInventory => {
                        self.manage_inventory_choice(user_id, text).await
                    }
                    ConversationState::EnteringDeleteTarget => {
                        self.receive_delete_target(user_id, text).await
                    }
                    ConversationState::ChoosingSellMethod => {
                        self.sell_method_choice(user_id, role, text).await
                    }
                    ConversationState::EnteringSellCount => {
                        self.receive_sell_count(user_id, role, text).await
                    }
                    ConversationState::ChoosingSubmitMethod => {
                        self.submit_method_choice(user_id, role, text).await
                    }
                    ConversationState::EnteringSubmission { kind } => {
                        self.receive_submission(inbound, role, kind, text).await
                    }
                    ConversationState::EnteringApprovalAmount {
                        submission_id,
                        seller,
                        credential,
                    } => {
                        self.receive_approval_amount(user_id, submission_id, seller, &credential, text)
                            .await
                    }
                    ConversationState::EnteringRejectionReason {
                        submission_id,
                        seller,
                        credential,
                    } => {
                        self.receive_rejection_reason(user_id, submission_id, seller, &credential, text)
                            .await
                    }
                }
            }
        }
    }

    // -- Entry points --

    async fn start(&self, inbound: &Inbound, args: Option<&str>) -> Replies {
        let user_id = inbound.user_id;
        let abandoned = self.sessions.clear(user_id).await;
        if abandoned != ConversationState::Idle {
            info!("User {} restarted during {}", user_id, abandoned.activity());
        }

        let referrer = args.and_then(|a| a.trim().parse::<UserId>().ok());
        let role = self.touch(user_id, referrer).await?;
        let name = inbound.display_name.as_deref().unwrap_or("friend");

        let text = match role {
            Role::Admin => format!("Welcome, {}! Ready when you are.", name),
            Role::User => {
                let mut text = format!("Welcome, {}!\n\nPick an option from the menu below.", name);
                if let Some(link) = &self.config.channel_link {
                    text.push_str(&format!("\nJoin our channel to stay up to date: {}", link));
                }
                text.push_str("\n\nGood luck! 💪");
                text
            }
        };

        info!("User {} ({}) started the bot", user_id, role.as_str());
        Ok(vec![reply(user_id, text, role)])
    }

    async fn cancel(&self, user_id: UserId) -> Replies {
        let role = self.touch(user_id, None).await?;
        let abandoned = self.sessions.clear(user_id).await;

        let text = match abandoned {
            ConversationState::Idle => "There is nothing to cancel.".to_string(),
            state => {
                info!("User {} cancelled {}", user_id, state.activity());
                format!("Cancelled {}. Nothing was saved.", state.activity())
            }
        };
        Ok(vec![reply(user_id, text, role)])
    }

    async fn main_menu_choice(&self, user_id: UserId, role: Role, text: &str) -> Replies {
        let Some(button) = Button::from_label(text) else {
            return Ok(vec![reply(user_id, NOT_UNDERSTOOD, role)]);
        };

        match (button, role) {
            (Button::Stats, _) => self.stats(user_id, role).await,
            (Button::Back | Button::BackToMain, _) => Ok(vec![reply(user_id, BACK_AT_MENU, role)]),

            (Button::AddInventory, Role::Admin) => {
                self.sessions.set(user_id, ConversationState::AddingInventory).await;
                Ok(vec![prompt(
                    user_id,
                    "Send the inventory accounts, one per line:\n\
                     credential1:secret1\ncredential2:secret2\n\nSend /cancel to abort.",
                )])
            }
            (Button::ManageInventory, Role::Admin) => self.manage_inventory_start(user_id).await,
            (Button::ReviewSubmissions, Role::Admin) => self.review_start(user_id).await,
            (Button::ReviewWithdrawals | Button::ManageBalances | Button::Broadcast, Role::Admin) => {
                info!("Admin {} pressed unimplemented '{}'", user_id, button.label());
                Ok(vec![reply(user_id, COMING_SOON, role)])
            }

            (Button::Sell, Role::User) => {
                self.sessions.set(user_id, ConversationState::ChoosingSellMethod).await;
                Ok(vec![
                    Outgoing::new(user_id, "Which kind of accounts would you like?")
                        .with_keyboard(keyboards::sell_menu()),
                ])
            }
            (Button::Submit, Role::User) => {
                self.sessions.set(user_id, ConversationState::ChoosingSubmitMethod).await;
                Ok(vec![
                    Outgoing::new(user_id, "What kind of account are you submitting for review?")
                        .with_keyboard(keyboards::submit_menu()),
                ])
            }
            (Button::Balance, Role::User) => self.balance(user_id).await,
            (Button::Withdraw, Role::User) => {
                info!("User {} pressed unimplemented '{}'", user_id, button.label());
                Ok(vec![reply(user_id, COMING_SOON, role)])
            }
            (Button::ResubmitSelfSourced, Role::User) => {
                self.begin_submission(user_id, SubmissionKind::SelfSourced).await
            }

            (
                Button::AddInventory
                | Button::ManageInventory
                | Button::ReviewSubmissions
                | Button::ReviewWithdrawals
                | Button::ManageBalances
                | Button::Broadcast,
                Role::User,
            ) => Ok(vec![reply(user_id, ADMINS_ONLY, role)]),
            (
                Button::Sell
                | Button::Submit
                | Button::Balance
                | Button::Withdraw
                | Button::ResubmitSelfSourced,
                Role::Admin,
            ) => Ok(vec![reply(user_id, USERS_ONLY, role)]),

            _ => Ok(vec![reply(user_id, NOT_UNDERSTOOD, role)]),
        }
    }

    async fn stats(&self, user_id: UserId, role: Role) -> Replies {
        let is_admin = role == Role::Admin;
        let (users, extra) = self
            .store(move |db| {
                let users = db.count_users()?;
                let extra = if is_admin {
                    Some((db.inventory_counts()?, db.pending_submissions()?.len()))
                } else {
                    None
                };
                Ok((users, extra))
            })
            .await?;

        let mut text = format!("Total bot users: {}", users);
        if let Some((counts, pending)) = extra {
            text.push_str(&format!(
                "\nInventory: {} available, {} sold, {} total\nSubmissions awaiting review: {}",
                counts.available, counts.sold, counts.total, pending
            ));
        }
        Ok(vec![reply(user_id, text, role)])
    }

    async fn balance(&self, user_id: UserId) -> Replies {
        let user = self.store(move |db| db.get_user(user_id)).await?;
        let (balance, referrals) = user.map(|u| (u.balance, u.referral_count)).unwrap_or_default();
        Ok(vec![reply(
            user_id,
            format!("Your balance: {}\nPeople you referred: {}", balance, referrals),
            Role::User,
        )])
    }

    // -- Inventory (admin) --

    async fn receive_inventory(&self, user_id: UserId, text: &str) -> Replies {
        let batch = parse::parse_credential_lines(text);
        let pairs = batch.credential_pairs();

        let results = self
            .store(move |db| db.add_inventory_batch(&pairs))
            .await?;
        let outcomes: Vec<(AddOutcome, String)> = results
            .into_iter()
            .zip(batch.pairs.iter().map(|p| p.credential.clone()))
            .collect();
        self.sessions.set(user_id, ConversationState::Idle).await;

        let mut out = Vec::new();
        if !batch.malformed.is_empty() {
            out.push(Outgoing::new(user_id, malformed_report(&batch.malformed)));
        }

        let duplicates: Vec<&str> = outcomes
            .iter()
            .filter(|(outcome, _)| *outcome == AddOutcome::Duplicate)
            .map(|(_, credential)| credential.as_str())
            .collect();
        if !duplicates.is_empty() {
            out.push(Outgoing::new(
                user_id,
                format!("Already stocked, skipped:\n{}", bullets(&duplicates)),
            ));
        }

        let added = outcomes.len() - duplicates.len();
        let summary = if added > 0 {
            info!("Admin {} stocked {} inventory accounts", user_id, added);
            format!("Added {} inventory account(s).", added)
        } else {
            format!("No accounts were added. {}", FORMAT_HINT)
        };
        out.push(reply(user_id, summary, Role::Admin));
        Ok(out)
    }

    async fn manage_inventory_start(&self, user_id: UserId) -> Replies {
        let counts = self.store(|db| db.inventory_counts()).await?;
        self.sessions.set(user_id, ConversationState::ManagingInventory).await;

        Ok(vec![
            Outgoing::new(
                user_id,
                format!(
                    "Inventory:\n- available: {}\n- sold: {}\n- total: {}\n\nChoose an action:",
                    counts.available, counts.sold, counts.total
                ),
            )
            .with_keyboard(keyboards::manage_inventory_menu()),
        ])
    }

    async fn manage_inventory_choice(&self, user_id: UserId, text: &str) -> Replies {
        match Button::from_label(text) {
            Some(Button::ListAvailable) => {
                let rows = self.store(|db| db.list_available_inventory()).await?;
                self.sessions.set(user_id, ConversationState::Idle).await;

                let text = if rows.is_empty() {
                    "No inventory accounts are available right now.".to_string()
                } else {
                    let listing: Vec<String> = rows
                        .iter()
                        .enumerate()
                        .map(|(i, r)| format!("{}. {}:{}", i + 1, r.credential, r.secret))
                        .collect();
                    format!("Available inventory accounts:\n\n{}", listing.join("\n"))
                };
                Ok(vec![reply(user_id, text, Role::Admin)])
            }
            Some(Button::DeleteAccount) => {
                self.sessions.set(user_id, ConversationState::EnteringDeleteTarget).await;
                Ok(vec![prompt(
                    user_id,
                    "Send the exact credential of the account to delete.\n\nSend /cancel to abort.",
                )])
            }
            Some(Button::Back | Button::BackToMain) => {
                self.sessions.set(user_id, ConversationState::Idle).await;
                Ok(vec![reply(user_id, BACK_AT_MENU, Role::Admin)])
            }
            _ => {
                self.sessions.set(user_id, ConversationState::Idle).await;
                Ok(vec![reply(
                    user_id,
                    format!("Invalid choice. {}", BACK_AT_MENU),
                    Role::Admin,
                )])
            }
        }
    }

    async fn receive_delete_target(&self, user_id: UserId, text: &str) -> Replies {
        let credential = text.trim().to_string();
        if credential.is_empty() {
            return Ok(vec![Outgoing::new(
                user_id,
                "Please send the credential to delete, or /cancel.",
            )]);
        }

        let target = credential.clone();
        let removed = self.store(move |db| db.remove_inventory(&target)).await?;
        self.sessions.set(user_id, ConversationState::Idle).await;

        let text = if removed {
            format!("Deleted {}.", credential)
        } else {
            format!("{} was not found in the inventory.", credential)
        };
        Ok(vec![reply(user_id, text, Role::Admin)])
    }

    // -- Selling (user) --

    async fn sell_method_choice(&self, user_id: UserId, role: Role, text: &str) -> Replies {
        match Button::from_label(text) {
            Some(Button::SellInventory) => {
                self.sessions.set(user_id, ConversationState::EnteringSellCount).await;
                Ok(vec![prompt(
                    user_id,
                    format!(
                        "How many inventory accounts would you like? ({} to {})",
                        parse::MIN_SELL_COUNT,
                        parse::MAX_SELL_COUNT
                    ),
                )])
            }
            Some(Button::SellSelfSourced) => {
                self.begin_submission(user_id, SubmissionKind::SelfSourced).await
            }
            Some(Button::Back | Button::BackToMain) => {
                self.sessions.set(user_id, ConversationState::Idle).await;
                Ok(vec![reply(user_id, BACK_AT_MENU, role)])
            }
            _ => {
                self.sessions.set(user_id, ConversationState::Idle).await;
                Ok(vec![reply(user_id, format!("Invalid choice. {}", BACK_AT_MENU), role)])
            }
        }
    }

    async fn receive_sell_count(&self, user_id: UserId, role: Role, text: &str) -> Replies {
        let count = match parse::parse_sell_count(text) {
            Ok(count) => count,
            Err(e) => {
                return Ok(vec![Outgoing::new(
                    user_id,
                    format!("Sorry, {}. Try again or send /cancel.", e),
                )]);
            }
        };

        let rows = self.store(move |db| db.allocate(user_id, count)).await?;
        self.sessions.set(user_id, ConversationState::Idle).await;

        if rows.is_empty() {
            return Ok(vec![reply(
                user_id,
                "Sorry, no inventory accounts are available right now. Please try again later.",
                role,
            )]);
        }

        let mut out = Vec::new();
        if rows.len() < count as usize {
            out.push(Outgoing::new(
                user_id,
                format!(
                    "Sorry, we could only provide {} of the {} accounts you asked for.",
                    rows.len(),
                    count
                ),
            ));
        }

        out.push(
            Outgoing::new(
                user_id,
                format!(
                    "Here are your accounts:\n\n{}\n\n\
                     Important: you have 24 hours to submit these accounts for review. \
                     After that they will no longer be accepted.",
                    credential_list(&rows)
                ),
            )
            .with_keyboard(keyboards::post_receive_menu()),
        );

        info!("User {} received {} inventory accounts", user_id, rows.len());
        Ok(out)
    }

    // -- Submissions (user) --

    async fn submit_method_choice(&self, user_id: UserId, role: Role, text: &str) -> Replies {
        match Button::from_label(text) {
            Some(Button::SubmitFromInventory) => {
                self.begin_submission(user_id, SubmissionKind::Inventory).await
            }
            Some(Button::SubmitSelfSourced) => {
                self.begin_submission(user_id, SubmissionKind::SelfSourced).await
            }
            Some(Button::Back | Button::BackToMain) => {
                self.sessions.set(user_id, ConversationState::Idle).await;
                Ok(vec![reply(user_id, BACK_AT_MENU, role)])
            }
            _ => {
                self.sessions.set(user_id, ConversationState::Idle).await;
                Ok(vec![reply(
                    user_id,
                    format!(
                        "Invalid choice. Pick '{}' or '{}' next time.",
                        Button::SubmitFromInventory.label(),
                        Button::SubmitSelfSourced.label()
                    ),
                    role,
                )])
            }
        }
    }

    async fn begin_submission(&self, user_id: UserId, kind: SubmissionKind) -> Replies {
        self.sessions
            .set(user_id, ConversationState::EnteringSubmission { kind })
            .await;

        let text = match kind {
            SubmissionKind::Inventory => {
                "Send the inventory accounts you bought here, one per line:\n\
                 credential:secret\n\n\
                 Only your most recent purchases will be accepted.\n\nSend /cancel to abort."
            }
            SubmissionKind::SelfSourced => {
                "Send your own accounts, one per line:\ncredential:secret\n\nSend /cancel to abort."
            }
        };
        Ok(vec![prompt(user_id, text)])
    }

    async fn receive_submission(
        &self,
        inbound: &Inbound,
        role: Role,
        kind: SubmissionKind,
        text: &str,
    ) -> Replies {
        let user_id = inbound.user_id;
        let batch = parse::parse_credential_lines(text);
        let pairs = batch.credential_pairs();

        // Read before writing so a failed read cannot strand a saved batch
        let (ids, recent) = self
            .store(move |db| {
                if pairs.is_empty() {
                    return Ok((vec![], vec![]));
                }
                let recent = db.recent_sales_to(user_id, RECENT_SALES_SHOWN)?;
                let ids = db.submit_batch(user_id, &pairs, kind)?;
                Ok((ids, recent))
            })
            .await?;
        self.sessions.set(user_id, ConversationState::Idle).await;

        let mut out = Vec::new();
        if !batch.malformed.is_empty() {
            out.push(Outgoing::new(user_id, malformed_report(&batch.malformed)));
        }

        if ids.is_empty() {
            out.push(reply(
                user_id,
                format!("No accounts were submitted. {}", FORMAT_HINT),
                role,
            ));
            return Ok(out);
        }

        out.push(reply(
            user_id,
            format!(
                "Sent {} account(s) for review. You will be notified of the decision within 24 hours.",
                ids.len()
            ),
            role,
        ));

        let submitted: Vec<String> = batch
            .pairs
            .iter()
            .map(|p| format!("{}:{}", p.credential, p.secret))
            .collect();
        let purchases = if recent.is_empty() {
            "(No inventory accounts have been sold to this user yet.)".to_string()
        } else {
            format!(
                "Last {} inventory accounts sold to this user:\n{}",
                recent.len(),
                credential_list(&recent)
            )
        };
        out.push(Outgoing::new(
            self.config.admin_id,
            format!(
                "New submission from {}\nKind: {}\n\n{}\n\n{}\n\nReview it under '{}'.",
                inbound.sender_label(),
                kind,
                bullets(&submitted),
                purchases,
                Button::ReviewSubmissions.label()
            ),
        ));

        info!("User {} submitted {} account(s) ({})", user_id, ids.len(), kind.as_str());
        Ok(out)
    }

    // -- Review (admin) --

    async fn review_start(&self, user_id: UserId) -> Replies {
        let pending = self.store(|db| db.pending_submissions()).await?;

        if pending.is_empty() {
            return Ok(vec![reply(
                user_id,
                "No submissions are waiting for review.",
                Role::Admin,
            )]);
        }

        let mut out: Vec<Outgoing> = pending
            .iter()
            .map(|s| {
                Outgoing::new(
                    user_id,
                    format!(
                        "Submission #{}\n- from user: {}\n- kind: {}\n- credential: {}\n- secret: {}\n- submitted: {}",
                        s.id, s.seller, s.kind, s.credential, s.secret, s.created_at
                    ),
                )
                .with_keyboard(keyboards::review_buttons(s.id))
            })
            .collect();

        out.push(reply(
            user_id,
            "All pending submissions are listed above. Use their buttons to accept or reject them.",
            Role::Admin,
        ));
        info!("Admin {} listed {} pending submissions", user_id, pending.len());
        Ok(out)
    }

    async fn review_callback(&self, user_id: UserId, data: &str) -> Replies {
        let role = self.touch(user_id, None).await?;

        let Some(action) = ReviewAction::parse(data) else {
            warn!("User {} sent unknown callback '{}'", user_id, data);
            return Ok(vec![Outgoing::new(user_id, "Unknown action.")]);
        };
        if role != Role::Admin {
            return Ok(vec![reply(user_id, ADMINS_ONLY, role)]);
        }

        let (ReviewAction::Accept(id) | ReviewAction::Reject(id)) = action;
        let submission = self
            .store(move |db| db.get_submission(id))
            .await?
            .filter(|s| !s.status.is_terminal());

        let Some(submission) = submission else {
            return Ok(vec![Outgoing::new(
                user_id,
                format!("Submission #{} no longer exists or was already handled.", id),
            )]);
        };

        let (state, text) = match action {
            ReviewAction::Accept(_) => (
                ConversationState::EnteringApprovalAmount {
                    submission_id: id,
                    seller: submission.seller,
                    credential: submission.credential.clone(),
                },
                format!(
                    "Accepting submission #{}:\n- credential: {}\n- secret: {}\n\n\
                     Enter the amount to credit to user {}.\nSend /cancel to abort.",
                    id, submission.credential, submission.secret, submission.seller
                ),
            ),
            ReviewAction::Reject(_) => (
                ConversationState::EnteringRejectionReason {
                    submission_id: id,
                    seller: submission.seller,
                    credential: submission.credential.clone(),
                },
                format!(
                    "Rejecting submission #{} ({}).\n\nEnter the reason for rejection.\nSend /cancel to abort.",
                    id, submission.credential
                ),
            ),
        };

        self.sessions.set(user_id, state).await;
        Ok(vec![prompt(user_id, text)])
    }

    async fn receive_approval_amount(
        &self,
        user_id: UserId,
        submission_id: i64,
        seller: UserId,
        credential: &str,
        text: &str,
    ) -> Replies {
        let credit = match parse::parse_credit_amount(text, self.config.max_credit) {
            Ok(credit) => credit,
            Err(e) => {
                return Ok(vec![Outgoing::new(
                    user_id,
                    format!("Sorry, {}. Enter the amount again or send /cancel.", e),
                )]);
            }
        };

        let outcome = self
            .store(move |db| db.decide(submission_id, &Decision::Approve { credit }))
            .await?;
        self.sessions.set(user_id, ConversationState::Idle).await;

        match outcome {
            DecideOutcome::Applied { seller, balance } => {
                let mut notice = format!(
                    "Your submission {} was approved! {} has been added to your balance.",
                    credential, credit
                );
                if let Some(balance) = balance {
                    notice.push_str(&format!("\nCurrent balance: {}", balance));
                }
                Ok(vec![
                    reply(
                        user_id,
                        format!(
                            "Approved submission #{} and credited {} to user {}.",
                            submission_id, credit, seller
                        ),
                        Role::Admin,
                    ),
                    Outgoing::new(seller, notice),
                ])
            }
            DecideOutcome::NotFound | DecideOutcome::AlreadyResolved => {
                warn!(
                    "Approval of submission {} for user {} refused: {:?}",
                    submission_id, seller, outcome
                );
                Ok(vec![reply(
                    user_id,
                    format!(
                        "Submission #{} was already handled or no longer exists. Nothing was credited.",
                        submission_id
                    ),
                    Role::Admin,
                )])
            }
        }
    }

    async fn receive_rejection_reason(
        &self,
        user_id: UserId,
        submission_id: i64,
        seller: UserId,
        credential: &str,
        text: &str,
    ) -> Replies {
        let reason = text.trim().to_string();
        if reason.is_empty() {
            return Ok(vec![Outgoing::new(
                user_id,
                "Please enter a reason for the rejection, or send /cancel.",
            )]);
        }

        let decision = Decision::Reject {
            reason: reason.clone(),
        };
        let outcome = self
            .store(move |db| db.decide(submission_id, &decision))
            .await?;
        self.sessions.set(user_id, ConversationState::Idle).await;

        match outcome {
            DecideOutcome::Applied { seller, .. } => Ok(vec![
                reply(
                    user_id,
                    format!(
                        "Rejected submission #{} and notified user {}.",
                        submission_id, seller
                    ),
                    Role::Admin,
                ),
                Outgoing::new(
                    seller,
                    format!(
                        "Your submission {} was rejected.\nReason: {}\n\n\
                         You can resubmit it as a self-sourced account, \
                         or change its password to keep it safe.",
                        credential, reason
                    ),
                )
                .with_keyboard(keyboards::rejected_menu()),
            ]),
            DecideOutcome::NotFound | DecideOutcome::AlreadyResolved => {
                warn!(
                    "Rejection of submission {} for user {} refused: {:?}",
                    submission_id, seller, outcome
                );
                Ok(vec![reply(
                    user_id,
                    format!(
                        "Submission #{} was already handled or no longer exists.",
                        submission_id
                    ),
                    Role::Admin,
                )])
            }
        }
    }

    // -- Helpers --

    /// Register the sender if new (promoting the configured admin) and
    /// return their role.
    async fn touch(&self, user_id: UserId, referrer: Option<UserId>) -> Result<Role, BotError> {
        let admin_id = self.config.admin_id;
        let user = self
            .store(move |db| {
                if user_id == admin_id {
                    db.promote_admin(user_id)?;
                } else {
                    db.register_user(user_id, referrer)?;
                }
                db.get_user(user_id)
            })
            .await?;
        Ok(user.map(|u| u.role).unwrap_or(Role::User))
    }

    /// Run a blocking store call off the async runtime.
    async fn store<F, T>(&self, f: F) -> Result<T, BotError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || f(db.as_ref())).await?;
        Ok(result?)
    }
}

/// A message that also restores the role's main menu.
fn reply(chat_id: UserId, text: impl Into<String>, role: Role) -> Outgoing {
    Outgoing::new(chat_id, text).with_keyboard(keyboards::main_menu(role))
}

/// A question awaiting free-text input; hides the reply keyboard.
fn prompt(chat_id: UserId, text: impl Into<String>) -> Outgoing {
    Outgoing::new(chat_id, text).with_keyboard(Keyboard::Remove)
}

fn bullets<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|s| format!("• {}", s.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn credential_list(rows: &[InventoryRow]) -> String {
    let lines: Vec<String> = rows
        .iter()
        .map(|r| format!("{}:{}", r.credential, r.secret))
        .collect();
    bullets(&lines)
}

fn malformed_report(lines: &[String]) -> String {
    format!(
        "Skipped {} malformed line(s), expected credential:secret:\n{}",
        lines.len(),
        bullets(lines)
    )
}
