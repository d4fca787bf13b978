use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use edge_bootstrap::{
    load_enrollment_conf, parse_key_value, AnsibleRunner, BootstrapRequest, DeviceFamily,
    EnrollmentType,
};
use edge_core::{EdgeError, MachineType, RegistrationProperties, Settings};
use edge_registry::DoniClient;
use edge_report::{render_config, render_device, render_device_list, OutputSink, TerminalSink};
use edge_workflow_engine::{
    run_delete, run_list, run_playbook_command, run_register, run_set, run_show, run_sync,
    run_workflow, BakeParams, BakeTarget, BakeWorkflow, BootstrapWorkflow, DeleteParams,
    PlaybookParams, RegisterParams, SetParams,
};
use env_logger::Env;
use log::LevelFilter;
use std::path::PathBuf;
use std::process::ExitCode;

/// `EX_TEMPFAIL`: the same command may succeed if run again later.
const EXIT_RETRY: u8 = 75;

#[derive(Debug, Parser)]
#[command(name = "chi-edge", version, about = "Enroll and provision edge devices", long_about = None)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Inventory service base URL.
    #[arg(long, global = true)]
    inventory_url: Option<String>,

    /// Token sent with inventory requests.
    #[arg(long, global = true)]
    auth_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage device records in the inventory.
    #[command(subcommand)]
    Device(DeviceCommand),
    /// Configure a freshly flashed device over SSH.
    Bootstrap(BootstrapArgs),
    /// Run any playbook from the playbook directory against one host.
    #[command(name = "ansible-playbook")]
    AnsiblePlaybook(PlaybookArgs),
}

#[derive(Debug, Subcommand)]
enum DeviceCommand {
    Register(RegisterArgs),
    List,
    Show {
        device: String,
    },
    Set(SetArgs),
    Delete {
        device: String,
        #[arg(long = "yes-i-really-really-mean-it")]
        really_mean_it: bool,
    },
    Sync {
        device: String,
    },
    /// Write the supervisor config.json for a device.
    Bake(BakeArgs),
}

#[derive(Debug, Args)]
struct RegisterArgs {
    name: String,
    #[arg(long)]
    machine_name: MachineType,
    #[arg(long)]
    contact_email: Option<String>,
    #[arg(long)]
    application_credential_id: Option<String>,
    #[arg(long)]
    application_credential_secret: Option<String>,
}

#[derive(Debug, Args)]
struct SetArgs {
    device: String,
    #[arg(long)]
    contact_email: Option<String>,
    /// May be repeated.
    #[arg(long = "authorized-project")]
    authorized_projects: Vec<String>,
    #[arg(long)]
    authorized_projects_reason: Option<String>,
    #[arg(long)]
    application_credential_id: Option<String>,
    #[arg(long)]
    application_credential_secret: Option<String>,
}

#[derive(Debug, Args)]
struct BakeArgs {
    device: String,
    /// Disk image to write into; without it config.json is created locally.
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long, default_value = "config.json")]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct BootstrapArgs {
    host: String,
    #[arg(long)]
    device_type: DeviceFamily,
    #[arg(long, default_value = "legacy-openstack", value_parser = parse_enrollment_type)]
    enrollment_type: EnrollmentType,
    /// YAML mapping of enrollment variables.
    #[arg(long)]
    enrollment_conf: Option<PathBuf>,
    #[arg(long, default_value = "eth0")]
    network_interface: String,
    #[arg(long)]
    mgmt_channel_address: Option<String>,
    #[arg(long)]
    user_channel_address: Option<String>,
    #[arg(long, overrides_with = "no_sudo")]
    sudo: bool,
    #[arg(long, overrides_with = "sudo")]
    no_sudo: bool,
    #[arg(long)]
    sudo_password: Option<String>,
    #[arg(long = "extra-vars", value_parser = parse_key_value)]
    extra_vars: Vec<(String, String)>,
}

#[derive(Debug, Args)]
struct PlaybookArgs {
    host: String,
    #[arg(long)]
    playbook: String,
    #[arg(long)]
    group: Option<DeviceFamily>,
    #[arg(long = "host-vars", value_parser = parse_key_value)]
    host_vars: Vec<(String, String)>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    builder.init();
}

fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<EdgeError>() {
        Some(edge) if edge.is_retryable() => EXIT_RETRY,
        _ => 1,
    }
}

fn parse_enrollment_type(value: &str) -> Result<EnrollmentType, EdgeError> {
    match value {
        "legacy-openstack" => Ok(EnrollmentType::LegacyOpenstack),
        other => Err(EdgeError::InvalidInput(format!(
            "unsupported enrollment type {other:?}"
        ))),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load()?;
    if let Some(url) = &cli.inventory_url {
        settings.inventory_endpoint = url.clone();
    }
    if let Some(token) = &cli.auth_token {
        settings.auth_token = Some(token.clone());
    }
    Ok(settings)
}

fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    let mut sink = TerminalSink::stdout();
    match cli.command {
        Command::Device(command) => run_device(command, &settings, &mut sink),
        Command::Bootstrap(args) => {
            let runner = AnsibleRunner::from_settings(&settings);
            let request = bootstrap_request(args)?;
            run_workflow(BootstrapWorkflow::new(
                &runner,
                request,
                &settings.site_internal_vip,
            ))
        }
        Command::AnsiblePlaybook(args) => {
            let runner = AnsibleRunner::from_settings(&settings);
            run_playbook_command(
                &runner,
                &PlaybookParams {
                    playbook: args.playbook,
                    host: args.host,
                    group: args.group,
                    host_vars: args.host_vars,
                },
            )
        }
    }
}

fn run_device(command: DeviceCommand, settings: &Settings, sink: &mut dyn OutputSink) -> Result<()> {
    let registry = DoniClient::from_settings(settings)?;
    match command {
        DeviceCommand::Register(args) => {
            let device = run_register(
                &registry,
                &RegisterParams {
                    name: args.name,
                    machine: args.machine_name,
                    properties: RegistrationProperties {
                        contact_email: args.contact_email,
                        application_credential_id: args.application_credential_id,
                        application_credential_secret: args.application_credential_secret,
                    },
                },
            )?;
            render_device(sink, &device);
        }
        DeviceCommand::List => render_device_list(sink, &run_list(&registry)?),
        DeviceCommand::Show { device } => render_device(sink, &run_show(&registry, &device)?),
        DeviceCommand::Set(args) => {
            let device = run_set(
                &registry,
                &SetParams {
                    device_ref: args.device,
                    contact_email: args.contact_email,
                    authorized_projects: args.authorized_projects,
                    authorized_projects_reason: args.authorized_projects_reason,
                    application_credential_id: args.application_credential_id,
                    application_credential_secret: args.application_credential_secret,
                },
            )?;
            render_device(sink, &device);
        }
        DeviceCommand::Delete {
            device,
            really_mean_it,
        } => {
            let deleted = run_delete(
                &registry,
                &DeleteParams {
                    device_ref: device,
                    really_mean_it,
                },
            )?;
            sink.print_message(&format!("Deleted device {} ({})", deleted.name, deleted.id));
        }
        DeviceCommand::Sync { device } => {
            let id = run_sync(&registry, &device)?;
            sink.print_message(&format!("Requested sync of device {id}"));
        }
        DeviceCommand::Bake(args) => {
            let params = BakeParams {
                device_ref: args.device,
                image: args.image,
                output_path: args.output,
                legacy_api_key: settings.legacy_api_key,
            };
            let result = BakeWorkflow::new(&registry, params).execute()?;
            let title = match &result.target {
                BakeTarget::Image { path, partition } => {
                    format!("{} (partition {partition})", path.display())
                }
                BakeTarget::LocalFile(path) => path.display().to_string(),
            };
            render_config(sink, &title, &result.config);
        }
    }
    Ok(())
}

fn bootstrap_request(args: BootstrapArgs) -> Result<BootstrapRequest> {
    let enrollment_conf = args
        .enrollment_conf
        .as_deref()
        .map(load_enrollment_conf)
        .transpose()?;
    Ok(BootstrapRequest {
        enrollment_type: args.enrollment_type,
        enrollment_conf,
        network_interface: Some(args.network_interface),
        mgmt_channel_address: args.mgmt_channel_address,
        user_channel_address: args.user_channel_address,
        sudo: args.sudo || !args.no_sudo,
        sudo_password: args.sudo_password,
        extra_vars: args.extra_vars,
        ..BootstrapRequest::new(&args.host, args.device_type)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("chi-edge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bake_defaults_to_local_config() {
        let cli = parse(&["device", "bake", "pi-lab-1"]);
        match cli.command {
            Command::Device(DeviceCommand::Bake(args)) => {
                assert_eq!(args.image, None);
                assert_eq!(args.output, PathBuf::from("config.json"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn register_parses_machine_name() {
        let cli = parse(&["device", "register", "nano-1", "--machine-name", "jetson-nano"]);
        match cli.command {
            Command::Device(DeviceCommand::Register(args)) => {
                assert_eq!(args.machine_name, MachineType::JetsonNano);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["chi-edge", "device", "register", "x", "--machine-name", "pc"]).is_err());
    }

    #[test]
    fn delete_flag_is_spelled_out() {
        let cli = parse(&["device", "delete", "pi", "--yes-i-really-really-mean-it"]);
        assert!(matches!(
            cli.command,
            Command::Device(DeviceCommand::Delete { really_mean_it: true, .. })
        ));
    }

    #[test]
    fn bootstrap_options_map_onto_request() {
        let cli = parse(&[
            "-vv",
            "bootstrap",
            "10.0.0.5",
            "--device-type",
            "nano",
            "--no-sudo",
            "--mgmt-channel-address",
            "10.10.0.2",
            "--extra-vars",
            "a=1",
            "--extra-vars",
            "b=x=y",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Bootstrap(args) = cli.command else {
            panic!("expected bootstrap");
        };
        let request = bootstrap_request(args).unwrap();
        assert_eq!(request.family, DeviceFamily::Nano);
        assert!(!request.sudo);
        assert_eq!(request.network_interface.as_deref(), Some("eth0"));
        assert_eq!(request.mgmt_channel_address.as_deref(), Some("10.10.0.2"));
        assert_eq!(
            request.extra_vars,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "x=y".to_string())
            ]
        );
    }

    #[test]
    fn malformed_extra_vars_are_rejected() {
        assert!(Cli::try_parse_from([
            "chi-edge",
            "bootstrap",
            "pi",
            "--device-type",
            "raspberrypi",
            "--extra-vars",
            "novalue"
        ])
        .is_err());
    }

    #[test]
    fn retryable_errors_exit_with_tempfail() {
        let pending = anyhow::Error::new(EdgeError::EnrollmentIncomplete {
            device: "pi".to_string(),
            reason: "no worker".to_string(),
        })
        .context("bake pi");
        assert_eq!(exit_status(&pending), EXIT_RETRY);
        assert_eq!(exit_status(&EdgeError::not_found("device pi").into()), 1);
        assert_eq!(exit_status(&anyhow::anyhow!("other")), 1);
    }
}
