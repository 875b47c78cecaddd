#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "model",
    action: "set_model",
}];

/// Commands whose path argument may be omitted to reuse the active camera.
pub(crate) const OPTIONAL_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "scan",
        action: "scan",
    },
    CommandSpec {
        command: "probe",
        action: "probe",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "camera",
    action: "camera_on",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "camera_off",
        action: "camera_off",
    },
    CommandSpec {
        command: "history",
        action: "history",
    },
    CommandSpec {
        command: "summary",
        action: "summary",
    },
    CommandSpec {
        command: "clear",
        action: "clear",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/camera <image>",
    "/camera_off",
    "/scan [image]",
    "/probe [image]",
    "/history",
    "/summary",
    "/clear",
    "/model <name>",
    "/help",
    "/quit",
];
