//! CLI command implementations.

use crate::colors;
use crate::exit_codes::ExitCode;
use crate::{ConfigAction, ModeArg, Output, PickArgs};
use scbridge::{Bridge, ContentPicker, EventLoop, PlatformLoop, PlatformPicker, PLATFORM_NAME};
use scbridge_common::config::{self, BridgeConfig};
use scbridge_common::{ActivationPolicy, PickerConfiguration, PickerMode};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

fn print_json(value: &impl Serialize) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("{}", colors::error(&format!("Failed to serialize output: {}", e)));
            ExitCode::GeneralError
        }
    }
}

impl From<ModeArg> for PickerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::SingleWindow => PickerMode::SINGLE_WINDOW,
            ModeArg::MultipleWindows => PickerMode::MULTIPLE_WINDOWS,
            ModeArg::SingleApplication => PickerMode::SINGLE_APPLICATION,
            ModeArg::MultipleApplications => PickerMode::MULTIPLE_APPLICATIONS,
            ModeArg::SingleDisplay => PickerMode::SINGLE_DISPLAY,
        }
    }
}

/// Overlay command-line flags on the configured picker defaults.
pub fn picker_configuration(args: &PickArgs, defaults: &PickerConfiguration) -> PickerConfiguration {
    let mut config = defaults.clone();
    if !args.mode.is_empty() {
        config.allowed_picker_modes = args
            .mode
            .iter()
            .fold(PickerMode::empty(), |acc, mode| acc | PickerMode::from(*mode));
    }
    config.excluded_bundle_ids.extend(args.exclude_bundle.iter().cloned());
    config.excluded_window_ids.extend(args.exclude_window.iter().copied());
    if args.allow_change {
        config.allows_changing_selected_content = true;
    }
    config
}

/// Present the platform picker and report the selection.
pub fn pick(args: PickArgs, config: &BridgeConfig, out: Output) -> ExitCode {
    let picker_config = picker_configuration(&args, &config.picker);
    debug!(?picker_config, "Presenting picker");

    let bridge = Bridge::from_config(PlatformLoop::default(), config);
    let picker = ContentPicker::new(PlatformPicker::default());

    match bridge.pick(&picker, picker_config) {
        Ok(filter) => {
            let selected = filter.to_string();
            if out.json {
                print_json(&json!({ "status": "selected", "content": selected }))
            } else {
                if out.quiet {
                    println!("{}", selected);
                } else {
                    println!("{} {}", colors::success("Selected:"), colors::content(&selected));
                }
                ExitCode::Success
            }
        }
        Err(e) => {
            let code = ExitCode::from(&e);
            if out.json {
                let status = if e.is_cancelled() { "cancelled" } else { "error" };
                print_json(&json!({ "status": status, "error": e.to_string() }));
            } else if e.is_cancelled() {
                if !out.quiet {
                    eprintln!("{}", colors::notice("Picker cancelled."));
                }
            } else {
                eprintln!("{}", colors::error(&e.to_string()));
            }
            code
        }
    }
}

/// What `status` can observe from a fresh process.
///
/// Lease phase and guest counts live inside the process that runs the
/// bridge, so they are not part of this report.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub platform: &'static str,
    pub loop_running: bool,
    pub activation_policy: ActivationPolicy,
    pub promote_prohibited_policy: bool,
    pub picker_modes: PickerMode,
}

pub fn status_report(event_loop: &impl EventLoop, config: &BridgeConfig) -> StatusReport {
    StatusReport {
        platform: PLATFORM_NAME,
        loop_running: event_loop.is_running(),
        activation_policy: event_loop.activation_policy(),
        promote_prohibited_policy: config.event_loop.promote_prohibited_policy,
        picker_modes: config.picker.allowed_picker_modes,
    }
}

/// Show the platform event loop and the configured session settings.
pub fn status(config: &BridgeConfig, out: Output) -> ExitCode {
    let report = status_report(&PlatformLoop::default(), config);

    if out.json {
        return print_json(&report);
    }

    println!("{}", colors::header("Event loop"));
    println!("  {:<20} {}", "Platform:", report.platform);
    println!("  {:<20} {}", "Running:", colors::yes_no(report.loop_running));
    println!("  {:<20} {}", "Activation policy:", report.activation_policy);
    if !out.quiet {
        println!(
            "  {:<20} {}",
            "Promote prohibited:",
            colors::yes_no(report.promote_prohibited_policy)
        );
        println!("  {:<20} {}", "Picker modes:", report.picker_modes);
    }
    ExitCode::Success
}

/// Show, locate or reset the configuration file.
pub fn config(action: ConfigAction, current: &BridgeConfig, out: Output) -> ExitCode {
    match action {
        ConfigAction::Show => print_json(current),
        ConfigAction::Path => match config::config_path() {
            Ok(path) => {
                let path = path.display().to_string();
                if out.json {
                    print_json(&json!({ "path": path }))
                } else {
                    println!("{}", colors::path(&path));
                    ExitCode::Success
                }
            }
            Err(e) => {
                eprintln!("{}", colors::error(&e));
                ExitCode::GeneralError
            }
        },
        ConfigAction::Reset => match config::save_config(&BridgeConfig::default()) {
            Ok(path) => {
                let path = path.display().to_string();
                if out.json {
                    print_json(&json!({ "status": "reset", "path": path }))
                } else {
                    if !out.quiet {
                        println!("{} {}", colors::success("Configuration reset:"), colors::path(&path));
                    }
                    ExitCode::Success
                }
            }
            Err(e) => {
                eprintln!("{}", colors::error(&e));
                ExitCode::GeneralError
            }
        },
    }
}

/// Show version information.
pub fn version(out: Output) {
    let version = env!("CARGO_PKG_VERSION");
    if out.json {
        print_json(&json!({ "version": version }));
    } else {
        println!("scbridge {}", version);
        if !out.quiet {
            println!("{}", colors::dim(&format!("platform: {}", PLATFORM_NAME)));
        }
    }
}
