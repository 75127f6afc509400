use crate::{
    app::App,
    config::{self, AppConfig},
    extension::SET_REFERENCE_TITLE,
    library::{LibraryError, ModEntry, Profile},
    logging,
    reference::REFERENCE_FEATURE,
    selector::{CONTINUE_LABEL, NONE_CHOICE},
    ui,
};
use anyhow::{bail, Context, Result};
use log::LevelFilter;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
}

impl Verbosity {
    fn echo_level(self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::Error,
            Verbosity::Normal => LevelFilter::Warn,
            Verbosity::Verbose => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
        }
    }
}

struct GlobalOptions {
    format: OutputFormat,
    data_dir: Option<PathBuf>,
    profile: Option<String>,
    verbosity: Verbosity,
}

enum CliCommand {
    Ui,
    Status { filter: Option<String> },
    Profiles,
    Activate(String),
    Reference(String),
    Toggle(Vec<String>),
    Set { value: String, mods: Vec<String> },
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, tokens) = parse_global_options(&args)?;
    let command = parse_command(&tokens)?;
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("refprofile v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliCommand::Ui => {
            let mut app = start_app(&global, None)?;
            let result = ui::run(&mut app);
            app.save()?;
            result
        }
        command => {
            let mut app = start_app(&global, Some(global.verbosity))?;
            run_command(&mut app, command, &global)
        }
    }
}

fn start_app(global: &GlobalOptions, echo: Option<Verbosity>) -> Result<App> {
    let data_dir = config::resolve_data_dir(global.data_dir.as_deref())?;
    let config = AppConfig::load_or_create(&data_dir)?;
    let mut level = config.level_filter();
    if let Some(verbosity) = echo {
        level = level.max(verbosity.echo_level());
    }
    let logs = logging::init(&data_dir, level, echo.map(Verbosity::echo_level))
        .context("initialize logging")?;
    log::debug!("Data dir: {}", data_dir.display());
    App::initialize(data_dir, config, logs)
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut format = OutputFormat::Text;
    let mut data_dir = None;
    let mut profile = None;
    let mut verbosity = Verbosity::Normal;
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            format = parse_format(value)?;
            continue;
        }
        if arg == "--format" {
            let value = iter.next().context("--format requires a value")?;
            format = parse_format(value)?;
            continue;
        }
        if let Some(value) = arg.strip_prefix("--data-dir=") {
            data_dir = Some(PathBuf::from(value));
            continue;
        }
        if arg == "--data-dir" {
            let value = iter.next().context("--data-dir requires a path")?;
            data_dir = Some(PathBuf::from(value));
            continue;
        }
        if let Some(value) = arg.strip_prefix("--profile=") {
            profile = Some(value.to_string());
            continue;
        }
        if arg == "--profile" {
            let value = iter.next().context("--profile requires a profile id")?;
            profile = Some(value.to_string());
            continue;
        }
        match arg.as_str() {
            "-q" | "--quiet" => verbosity = Verbosity::Quiet,
            "--verbose" => verbosity = Verbosity::Verbose,
            _ if arg.starts_with("-v") && arg.chars().skip(1).all(|ch| ch == 'v') => {
                let count = arg.chars().filter(|ch| *ch == 'v').count();
                verbosity = if count >= 2 {
                    Verbosity::Debug
                } else {
                    Verbosity::Verbose
                };
            }
            _ => tokens.push(arg.to_string()),
        }
    }

    Ok((
        GlobalOptions {
            format,
            data_dir,
            profile,
            verbosity,
        },
        tokens,
    ))
}

fn parse_format(value: &str) -> Result<OutputFormat> {
    OutputFormat::parse(value)
        .ok_or_else(|| anyhow::anyhow!("Unknown format: {value} (use 'text' or 'json')"))
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let Some(head) = tokens.first() else {
        return Ok(CliCommand::Ui);
    };
    let rest = tokens.get(1..).unwrap_or(&[]);
    let command = match head.as_str() {
        "ui" => CliCommand::Ui,
        "help" | "--help" | "-h" => CliCommand::Help,
        "version" | "--version" | "-V" => CliCommand::Version,
        "status" => CliCommand::Status {
            filter: parse_status_filter(rest)?,
        },
        "profiles" => CliCommand::Profiles,
        "activate" => {
            let id = rest.first().context("activate requires a profile id")?;
            CliCommand::Activate(id.to_string())
        }
        "reference" => {
            let target = rest.first().context("reference requires a profile id or 'none'")?;
            CliCommand::Reference(target.to_string())
        }
        "toggle" => {
            if rest.is_empty() {
                bail!("toggle requires one or more mod ids");
            }
            CliCommand::Toggle(rest.to_vec())
        }
        "set" => {
            let value = rest.first().context("set requires a value")?;
            let mods = rest.get(1..).unwrap_or(&[]).to_vec();
            if mods.is_empty() {
                bail!("set requires one or more mod ids");
            }
            CliCommand::Set {
                value: value.to_string(),
                mods,
            }
        }
        other => bail!("Unknown command: {other} (see 'refprofile help')"),
    };
    Ok(command)
}

fn parse_status_filter(args: &[String]) -> Result<Option<String>> {
    let mut filter = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--filter" {
            let value = iter.next().context("--filter requires a value")?;
            filter = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--filter=") {
            filter = Some(value.to_string());
        } else {
            bail!("Unexpected argument for status: {arg}");
        }
    }
    Ok(filter)
}

fn run_command(app: &mut App, command: CliCommand, global: &GlobalOptions) -> Result<()> {
    match command {
        CliCommand::Status { filter } => {
            if let Some(filter) = &filter {
                check_filter(app, filter)?;
            }
            app.filter = filter;
            print_status(app, &app.visible_mods(), global.format)
        }
        CliCommand::Profiles => list_profiles(app, global.format),
        CliCommand::Activate(id) => {
            if !app.activate_profile(&id) {
                return Err(LibraryError::UnknownProfile(id).into());
            }
            app.save()?;
            println!("Active profile: {id}");
            Ok(())
        }
        CliCommand::Reference(target) => {
            set_reference(app, &target, global.profile.as_deref())?;
            app.save()
        }
        CliCommand::Toggle(ids) => {
            let mods = resolve_mods(app, &ids)?;
            app.edit_status(&mods, None)?;
            finish_edit(app, &ids, global.format)
        }
        CliCommand::Set { value, mods: ids } => {
            let mods = resolve_mods(app, &ids)?;
            app.edit_status(&mods, Some(value.as_str()))?;
            finish_edit(app, &ids, global.format)
        }
        CliCommand::Ui | CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

fn check_filter(app: &App, filter: &str) -> Result<()> {
    let known: Vec<String> = app
        .status_column()
        .and_then(|column| column.filter.as_ref())
        .map(|options| {
            options
                .options
                .iter()
                .map(|option| option.value.clone())
                .collect()
        })
        .unwrap_or_default();
    if !known.iter().any(|value| value == filter) {
        bail!("Unknown filter: {filter} (use {})", known.join(", "));
    }
    Ok(())
}

fn set_reference(app: &App, target: &str, base: Option<&str>) -> Result<()> {
    let state = app.state();
    let base = match base {
        Some(id) => state
            .profile_by_id(id)
            .ok_or_else(|| LibraryError::UnknownProfile(id.to_string()))?
            .clone(),
        None => state
            .active_profile()
            .context("No active profile")?
            .clone(),
    };
    let choice = if target.eq_ignore_ascii_case("none") {
        NONE_CHOICE
    } else {
        target
    };

    if !app.run_profile_action(SET_REFERENCE_TITLE, &[base.id.clone()]) {
        bail!("Action '{SET_REFERENCE_TITLE}' is not registered");
    }
    if !app.dialogs.select_choice(choice) {
        app.dialogs.cancel();
        bail!(
            "'{target}' cannot serve as reference for '{}' (pick another profile of game '{}')",
            base.id,
            base.game_id
        );
    }
    app.dialogs.resolve(CONTINUE_LABEL);

    let updated = app.state();
    match updated
        .profile_by_id(&base.id)
        .and_then(|profile| profile.feature_str(REFERENCE_FEATURE))
    {
        Some(reference) => println!("Reference of '{}': {reference}", base.id),
        None => println!("Reference of '{}' cleared", base.id),
    }
    Ok(())
}

fn resolve_mods(app: &App, ids: &[String]) -> Result<Vec<ModEntry>> {
    let state = app.state();
    let profile = state.active_profile().context("No active profile")?;
    ids.iter()
        .map(|id| {
            state
                .find_mod(&profile.game_id, id)
                .cloned()
                .ok_or_else(|| {
                    anyhow::Error::from(LibraryError::UnknownMod {
                        game_id: profile.game_id.clone(),
                        mod_id: id.clone(),
                    })
                })
        })
        .collect()
}

fn finish_edit(app: &mut App, ids: &[String], format: OutputFormat) -> Result<()> {
    app.poll_events();
    let installs = app.take_install_requests();
    if format == OutputFormat::Text {
        for id in &installs {
            println!("Install requested: {id}");
        }
    }
    app.save()?;

    let state = app.state();
    let profile = state.active_profile().context("No active profile")?;
    let mods: Vec<ModEntry> = ids
        .iter()
        .filter_map(|id| state.find_mod(&profile.game_id, id).cloned())
        .collect();
    print_status(app, &mods, format)
}

#[derive(Serialize)]
struct StatusItem {
    id: String,
    name: String,
    install: Option<String>,
    active: bool,
    reference_status: String,
}

fn status_items(app: &App, mods: &[ModEntry]) -> Vec<StatusItem> {
    let active = app.active_profile();
    let column = app.status_column();
    mods.iter()
        .map(|entry| StatusItem {
            id: entry.id.clone(),
            name: entry.display_name().to_string(),
            install: entry.state.as_ref().map(|state| state.label().to_string()),
            active: active
                .as_ref()
                .is_some_and(|profile| profile.is_mod_enabled(&entry.id)),
            reference_status: column
                .map(|column| (column.calc)(entry))
                .unwrap_or_default(),
        })
        .collect()
}

fn print_status(app: &App, mods: &[ModEntry], format: OutputFormat) -> Result<()> {
    let items = status_items(app, mods);
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No mods.");
            }
            for item in items {
                println!(
                    "{:<16} {} {} ({})",
                    item.reference_status,
                    if item.active { "[x]" } else { "[ ]" },
                    item.id,
                    item.name
                );
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ProfileItem {
    id: String,
    name: String,
    game_id: String,
    active: bool,
    reference: Option<String>,
}

fn list_profiles(app: &App, format: OutputFormat) -> Result<()> {
    let state = app.state();
    let items: Vec<ProfileItem> = state
        .profiles
        .values()
        .map(|profile| profile_item(profile, state.active_profile.as_deref()))
        .collect();
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            for item in items {
                let marker = if item.active { "*" } else { " " };
                let reference = item
                    .reference
                    .map(|id| format!(" -> {id}"))
                    .unwrap_or_default();
                println!(
                    "{marker} {} ({}) [{}]{reference}",
                    item.id, item.name, item.game_id
                );
            }
        }
    }
    Ok(())
}

fn profile_item(profile: &Profile, active: Option<&str>) -> ProfileItem {
    ProfileItem {
        id: profile.id.clone(),
        name: profile.name.clone(),
        game_id: profile.game_id.clone(),
        active: active == Some(profile.id.as_str()),
        reference: profile.feature_str(REFERENCE_FEATURE).map(str::to_string),
    }
}

fn print_help() {
    println!("refprofile v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  refprofile                        Launch TUI");
    println!("  refprofile status                 Reference status of the active game's mods");
    println!("  refprofile profiles               List profiles");
    println!("  refprofile activate <profile>     Set the active profile");
    println!("  refprofile reference <profile|none>");
    println!("                                    Choose the reference profile");
    println!("  refprofile toggle <mod...>        Toggle mods in the reference profile");
    println!("  refprofile set <value> <mod...>   Set mods to 'enabled' or 'disabled'");
    println!();
    println!("Global options:");
    println!("  --data-dir <path>                 Data directory (or {})", config::DATA_DIR_ENV);
    println!("  --format <json|text>              Output format");
    println!("  --profile <id>                    Base profile for 'reference'");
    println!("  --filter <value>                  Status filter: Enabled | Disabled | Uninstalled");
    println!("  -q, --quiet                       Errors only");
    println!("  -v, -vv                           Increase verbosity");
    println!("  -h, --help                        Show help");
    println!("  -V, --version                     Show version");
}
