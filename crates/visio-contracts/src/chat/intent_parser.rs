use std::path::PathBuf;

use crate::models::{AspectRatio, MAX_IMAGES_PER_REQUEST};
use crate::suggest::clamp_prompt;

use super::command_registry::is_known;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Noop,
    Generate { prompt: String },
    SetImageCount(u8),
    SetAspectRatio(AspectRatio),
    Attach(PathBuf),
    Detach,
    Coupon(String),
    Quota,
    History,
    SelectHistory(usize),
    Gallery,
    Preview(usize),
    Download { index: usize, dir: Option<PathBuf> },
    Suggest(String),
    Help,
    Quit,
    Invalid { command: String, message: String },
    Unknown { command: String },
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .collect(),
    }
}

// 1-based list position as typed by the user.
fn parse_position(command: &str, arg: &str) -> Result<usize, Intent> {
    arg.trim()
        .parse::<usize>()
        .ok()
        .filter(|value| *value >= 1)
        .ok_or_else(|| invalid(command, "expected a positive number"))
}

fn invalid(command: &str, message: &str) -> Intent {
    Intent::Invalid {
        command: command.to_string(),
        message: message.to_string(),
    }
}

fn parse_command(command: &str, arg: &str) -> Intent {
    match command {
        "images" => match arg.trim().parse::<u8>() {
            Ok(count) if (1..=MAX_IMAGES_PER_REQUEST).contains(&count) => {
                Intent::SetImageCount(count)
            }
            _ => invalid(command, "expected a number from 1 to 4"),
        },
        "aspect" => match arg.parse::<AspectRatio>() {
            Ok(ratio) => Intent::SetAspectRatio(ratio),
            Err(message) => invalid(command, &message),
        },
        "attach" => {
            let parts = parse_path_args(arg);
            if parts.is_empty() {
                return invalid(command, "expected an image path");
            }
            Intent::Attach(PathBuf::from(parts.join(" ")))
        }
        "detach" => Intent::Detach,
        "coupon" => {
            if arg.trim().is_empty() {
                return invalid(command, "expected a coupon code");
            }
            Intent::Coupon(arg.trim().to_string())
        }
        "quota" => Intent::Quota,
        "history" => Intent::History,
        "select" => parse_position(command, arg).map_or_else(|err| err, Intent::SelectHistory),
        "gallery" => Intent::Gallery,
        "preview" => parse_position(command, arg).map_or_else(|err| err, Intent::Preview),
        "download" => {
            let parts = parse_path_args(arg);
            let Some(first) = parts.first() else {
                return invalid(command, "expected a gallery number");
            };
            match parse_position(command, first) {
                Ok(index) => Intent::Download {
                    index,
                    dir: (parts.len() > 1).then(|| PathBuf::from(parts[1..].join(" "))),
                },
                Err(err) => err,
            }
        }
        "suggest" => Intent::Suggest(arg.to_string()),
        "help" => Intent::Help,
        "quit" | "exit" => Intent::Quit,
        _ => Intent::Unknown {
            command: command.to_string(),
        },
    }
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::Noop;
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let remainder = slash_tail[command_len..].trim();
            if !is_known(&command) {
                return Intent::Unknown { command };
            }
            return parse_command(&command, remainder);
        }
    }

    Intent::Generate {
        prompt: clamp_prompt(raw_trimmed).to_string(),
    }
}
