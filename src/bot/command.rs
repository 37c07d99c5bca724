use teloxide::utils::command::BotCommands;

use crate::config::MAX_LOOKBACK_HOURS;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "snake_case", description = "Available commands:")]
pub(crate) enum Command {
    #[command(description = "Summarize recent posts: /summary [hours]")]
    Summary(String),
    #[command(description = "List the followed accounts")]
    ListAuthors,
    #[command(description = "Show the active language model")]
    Provider,
    #[command(description = "Show this help message")]
    Help,
}

/// Parse the optional `/summary` argument.
///
/// An empty argument means `default`. Anything else must be a whole number
/// of hours between 1 and [`MAX_LOOKBACK_HOURS`].
pub(crate) fn parse_hours(arg: &str, default: u32) -> Option<u32> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Some(default);
    }
    arg.parse::<u32>()
        .ok()
        .filter(|h| (1..=MAX_LOOKBACK_HOURS).contains(h))
}
