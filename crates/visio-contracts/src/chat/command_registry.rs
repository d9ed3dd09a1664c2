#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
}

pub const CHAT_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "images",
        usage: "/images N",
        summary: "number of images per prompt (1-4)",
    },
    CommandSpec {
        command: "aspect",
        usage: "/aspect RATIO",
        summary: "aspect ratio: 1:1, 3:4, 4:3, 9:16, 16:9",
    },
    CommandSpec {
        command: "attach",
        usage: "/attach PATH",
        summary: "attach a source image to edit",
    },
    CommandSpec {
        command: "detach",
        usage: "/detach",
        summary: "remove the attached image",
    },
    CommandSpec {
        command: "coupon",
        usage: "/coupon CODE",
        summary: "redeem a coupon to raise the generation limit",
    },
    CommandSpec {
        command: "quota",
        usage: "/quota",
        summary: "show plan and remaining generations",
    },
    CommandSpec {
        command: "history",
        usage: "/history",
        summary: "list past prompts, most recent first",
    },
    CommandSpec {
        command: "select",
        usage: "/select N",
        summary: "restore prompt N (and its source image)",
    },
    CommandSpec {
        command: "gallery",
        usage: "/gallery",
        summary: "list every generated image",
    },
    CommandSpec {
        command: "preview",
        usage: "/preview N",
        summary: "show details for gallery image N",
    },
    CommandSpec {
        command: "download",
        usage: "/download N [DIR]",
        summary: "save gallery image N to DIR",
    },
    CommandSpec {
        command: "suggest",
        usage: "/suggest TEXT",
        summary: "list keyword completions for TEXT",
    },
    CommandSpec {
        command: "help",
        usage: "/help",
        summary: "show this help",
    },
    CommandSpec {
        command: "quit",
        usage: "/quit",
        summary: "leave the session",
    },
];

pub(crate) fn is_known(command: &str) -> bool {
    CHAT_COMMANDS.iter().any(|spec| spec.command == command) || command == "exit"
}

pub fn help_text() -> String {
    let width = CHAT_COMMANDS
        .iter()
        .map(|spec| spec.usage.len())
        .max()
        .unwrap_or(0);
    let mut out = String::from("Type a prompt to generate images, or a command:\n");
    for spec in CHAT_COMMANDS {
        out.push_str(&format!("  {:<width$}  {}\n", spec.usage, spec.summary));
    }
    out
}
