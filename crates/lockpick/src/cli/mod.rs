pub mod handlers;

use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use lockpick_core::{LockMode, LockPath};

use crate::config::ConfigLayer;

pub fn build_cli() -> Command {
    Command::new("lockpick")
        .version(env!("CARGO_PKG_VERSION"))
        .about(
            "Distributed locking using Zookeeper primarily for scripting. After acquiring the \
             lock, the zk node is printed to STDOUT. This zk node should be passed to unlock. \
             Note: all logs are printed to STDERR",
        )
        .arg(
            Arg::new("servers")
                .short('s')
                .long("servers")
                .help("ZooKeeper ensemble, comma-separated host:port [default: 127.0.0.1:2181]"),
        )
        .arg(
            Arg::new("chroot")
                .short('c')
                .long("chroot")
                .help("ZK chroot for the lock path [default: /devops]"),
        )
        .arg(
            Arg::new("identifier")
                .short('i')
                .long("identifier")
                .help("Optional string identifier to add to the lock node OR verify when unlocking"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v info, -vv debug)"),
        )
        .arg(
            Arg::new("retry-count")
                .short('r')
                .long("retry-count")
                .value_parser(value_parser!(u32))
                .help("Times to poll the lock before giving up [default: 3]"),
        )
        .arg(
            Arg::new("retry-sleep")
                .short('p')
                .long("retry-sleep")
                .value_parser(value_parser!(u64))
                .help("Seconds between polls [default: 3]"),
        )
        .arg(
            Arg::new("session-timeout")
                .long("session-timeout")
                .value_parser(value_parser!(u64))
                .help("ZooKeeper session timeout in seconds [default: 10]"),
        )
        .arg(
            Arg::new("ephemeral")
                .long("ephemeral")
                .action(ArgAction::SetTrue)
                .help("Tie the lock node to this session instead of leaving it for unlock"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Read settings from this TOML file"),
        )
        .arg(
            Arg::new("action")
                .required(true)
                .value_parser(["lock", "rlock", "wlock", "unlock", "list"])
                .help(
                    "lock: acquire a mutex lock. rlock: acquire a read lock. wlock: acquire a \
                     write lock. unlock: release lock identified by zk node. list: list all \
                     lock contenders",
                ),
        )
        .arg(Arg::new("lock_path").required(true).help(
            "ZK path to lock OR ZK node to unlock. For unlock this must be the chrooted zk \
             path to the node, e.g. lockpick unlock -c /devops \
             /mylock/9d2badeec7684f35b10f4860db42e45c__rlock__0000000022",
        ))
}

/// What a command does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Acquire(LockMode),
    Unlock,
    List,
}

impl Action {
    /// Parse an action word
    ///
    /// # Errors
    /// Returns `UnknownMode` for anything but lock, rlock, wlock, unlock or list
    pub fn parse(word: &str) -> lockpick_core::Result<Self> {
        match word {
            "unlock" => Ok(Self::Unlock),
            "list" => Ok(Self::List),
            other => other.parse().map(Self::Acquire),
        }
    }
}

/// Target of a command, validated for its action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Logical lock path (lock, rlock, wlock, list)
    Lock(LockPath),
    /// Node path of a held lock (unlock)
    Node(String),
}

/// A parsed command line
#[derive(Debug, Clone)]
pub struct Invocation {
    pub action: Action,
    pub target: Target,
    pub verbosity: u8,
    pub config_file: Option<PathBuf>,
    pub flags: ConfigLayer,
}

impl Invocation {
    /// Extract and validate the invocation from parsed arguments
    ///
    /// # Errors
    /// Returns an error for an unknown action or a malformed path
    pub fn from_matches(matches: &ArgMatches) -> lockpick_core::Result<Self> {
        let word = matches
            .get_one::<String>("action")
            .map_or("", String::as_str);
        let raw_path = matches
            .get_one::<String>("lock_path")
            .map_or("", String::as_str);

        let action = Action::parse(word)?;
        let target = match action {
            Action::Unlock => {
                let (lock_path, name) = LockPath::split_node(raw_path)?;
                Target::Node(lock_path.child(&name))
            }
            Action::Acquire(_) | Action::List => Target::Lock(LockPath::new(raw_path)?),
        };

        let flags = ConfigLayer {
            servers: matches.get_one::<String>("servers").cloned(),
            chroot: matches.get_one::<String>("chroot").cloned(),
            identifier: matches.get_one::<String>("identifier").cloned(),
            retry_count: matches.get_one::<u32>("retry-count").copied(),
            retry_sleep: matches.get_one::<u64>("retry-sleep").copied(),
            session_timeout: matches.get_one::<u64>("session-timeout").copied(),
            cleanup_timeout: None,
            ephemeral: matches.get_flag("ephemeral").then_some(true),
        };

        Ok(Self {
            action,
            target,
            verbosity: matches.get_count("verbose"),
            config_file: matches.get_one::<PathBuf>("config").cloned(),
            flags,
        })
    }
}
