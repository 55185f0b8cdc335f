use mailmart_types::events::{InlineButton, Keyboard};
use mailmart_types::models::{ReviewAction, Role};

/// Every reply-keyboard button the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    // -- User menu --
    Sell,
    Submit,
    Balance,
    Withdraw,
    Stats,

    // -- Admin menu --
    AddInventory,
    ManageInventory,
    ReviewSubmissions,
    ReviewWithdrawals,
    ManageBalances,
    Broadcast,

    // -- Sell menu --
    SellInventory,
    SellSelfSourced,

    // -- Submit menu --
    SubmitFromInventory,
    SubmitSelfSourced,

    // -- Manage inventory menu --
    ListAvailable,
    DeleteAccount,

    // -- Navigation --
    Back,
    BackToMain,
    ResubmitSelfSourced,
}

const ALL: &[Button] = &[
    Button::Sell,
    Button::Submit,
    Button::Balance,
    Button::Withdraw,
    Button::Stats,
    Button::AddInventory,
    Button::ManageInventory,
    Button::ReviewSubmissions,
    Button::ReviewWithdrawals,
    Button::ManageBalances,
    Button::Broadcast,
    Button::SellInventory,
    Button::SellSelfSourced,
    Button::SubmitFromInventory,
    Button::SubmitSelfSourced,
    Button::ListAvailable,
    Button::DeleteAccount,
    Button::Back,
    Button::BackToMain,
    Button::ResubmitSelfSourced,
];

impl Button {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sell => "Sell accounts",
            Self::Submit => "Submit accounts",
            Self::Balance => "Balance",
            Self::Withdraw => "Withdraw earnings",
            Self::Stats => "Bot stats",
            Self::AddInventory => "Add inventory",
            Self::ManageInventory => "Manage inventory",
            Self::ReviewSubmissions => "Review submissions",
            Self::ReviewWithdrawals => "Review withdrawals",
            Self::ManageBalances => "Manage balances",
            Self::Broadcast => "Broadcast",
            Self::SellInventory => "Inventory accounts",
            Self::SellSelfSourced => "Self-sourced accounts",
            Self::SubmitFromInventory => "From inventory (bought here)",
            Self::SubmitSelfSourced => "Self-sourced (your own)",
            Self::ListAvailable => "List available",
            Self::DeleteAccount => "Delete account",
            Self::Back => "Back",
            Self::BackToMain => "Back to main menu",
            Self::ResubmitSelfSourced => "Resubmit as self-sourced",
        }
    }

    /// Exact label match after trimming.
    pub fn from_label(text: &str) -> Option<Self> {
        let text = text.trim();
        ALL.iter().copied().find(|b| b.label() == text)
    }
}

fn rows(layout: &[&[Button]]) -> Vec<Vec<String>> {
    layout
        .iter()
        .map(|row| row.iter().map(|b| b.label().to_string()).collect())
        .collect()
}

pub fn user_menu() -> Keyboard {
    Keyboard::Reply(rows(&[
        &[Button::Sell, Button::Submit],
        &[Button::Balance, Button::Withdraw],
        &[Button::Stats],
    ]))
}

pub fn admin_menu() -> Keyboard {
    Keyboard::Reply(rows(&[
        &[Button::AddInventory, Button::ManageInventory],
        &[Button::ReviewSubmissions, Button::ReviewWithdrawals],
        &[Button::ManageBalances, Button::Broadcast],
        &[Button::Stats],
    ]))
}

pub fn main_menu(role: Role) -> Keyboard {
    match role {
        Role::Admin => admin_menu(),
        Role::User => user_menu(),
    }
}

pub fn sell_menu() -> Keyboard {
    Keyboard::Reply(rows(&[
        &[Button::SellInventory],
        &[Button::SellSelfSourced],
        &[Button::Back],
    ]))
}

pub fn submit_menu() -> Keyboard {
    Keyboard::OneTime(rows(&[
        &[Button::SubmitFromInventory],
        &[Button::SubmitSelfSourced],
        &[Button::Back],
    ]))
}

pub fn manage_inventory_menu() -> Keyboard {
    Keyboard::Reply(rows(&[
        &[Button::ListAvailable],
        &[Button::DeleteAccount],
        &[Button::Back],
    ]))
}

/// Shown right after a buyer receives inventory accounts.
pub fn post_receive_menu() -> Keyboard {
    Keyboard::OneTime(rows(&[&[Button::Submit], &[Button::BackToMain]]))
}

/// Shown to a seller whose submission was rejected.
pub fn rejected_menu() -> Keyboard {
    Keyboard::OneTime(rows(&[&[Button::ResubmitSelfSourced], &[Button::BackToMain]]))
}

pub fn review_buttons(submission_id: i64) -> Keyboard {
    Keyboard::Inline(vec![vec![
        InlineButton {
            label: "Accept".to_string(),
            data: ReviewAction::Accept(submission_id).callback_data(),
        },
        InlineButton {
            label: "Reject".to_string(),
            data: ReviewAction::Reject(submission_id).callback_data(),
        },
    ]])
}
