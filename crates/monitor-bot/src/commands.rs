//! Chat command grammar and access control.

use std::collections::HashSet;

use regex::Regex;

use crate::telegram::{Chat, User};

/// A recognised bot command with its normalised arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    AddUser(Vec<String>),
    RemoveUser(Vec<String>),
    ListUsers,
    GetFollowing(Option<String>),
}

impl Command {
    /// Parse a message text such as `/add_user @alice bob` or
    /// `/start@FollowBot`. Returns `None` for plain text and unknown commands.
    ///
    /// Arguments are split on whitespace and stripped of surrounding `@`.
    pub fn parse(text: &str) -> Option<Self> {
        let re = Regex::new(r"(?s)^/([A-Za-z_]+)(?:@\w+)?(?:\s+(.*))?$").expect("regex is valid");
        let caps = re.captures(text.trim())?;
        let args: Vec<String> = caps
            .get(2)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .split_whitespace()
            .map(|arg| arg.trim_matches('@').to_string())
            .filter(|arg| !arg.is_empty())
            .collect();

        match caps[1].to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "stop" => Some(Command::Stop),
            "add_user" => Some(Command::AddUser(args)),
            "remove_user" => Some(Command::RemoveUser(args)),
            "list_users" => Some(Command::ListUsers),
            "get_following" => Some(Command::GetFollowing(args.into_iter().next())),
            _ => None,
        }
    }
}

// ── Authorization ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    NotGroup,
    NotAuthorized,
}

impl Authorization {
    /// Reply sent when the command is refused.
    pub fn rejection(self) -> Option<&'static str> {
        match self {
            Authorization::Granted => None,
            Authorization::NotGroup => Some("This bot can only be used in groups!"),
            Authorization::NotAuthorized => Some("You are not authorized to use this bot!"),
        }
    }
}

/// Commands are accepted only in group chats and only from listed usernames.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    users: HashSet<String>,
}

impl Authorizer {
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
        }
    }

    pub fn check(&self, chat: &Chat, from: Option<&User>) -> Authorization {
        if !chat.is_group() {
            return Authorization::NotGroup;
        }
        match from.and_then(|u| u.username.as_deref()) {
            Some(name) if self.users.contains(name) => Authorization::Granted,
            _ => Authorization::NotAuthorized,
        }
    }
}
