use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use skyfleet_cloud::{CloudClient, Reconciler};
use skyfleet_cloud_aws::AwsClient;
use skyfleet_deploy::{
    Command, ConsoleReporter, DeployOptions, Deployer, Executor, OpenSshShellFactory, Throttle,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "skyfleet")]
#[command(version)]
#[command(about = "Provision AWS deployments and configure their hosts through a bastion", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project file
    #[arg(
        short,
        long,
        global = true,
        env = "SKYFLEET_PROJECT",
        default_value = "skyfleet.json"
    )]
    project: PathBuf,

    /// Keep full task logs and debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Ping attempts for ping_instances
    #[arg(short = 'n', long, global = true, default_value_t = 1)]
    ping_repetitions: u32,

    /// Print the project, with runtime addresses, after the command
    #[arg(short = 's', long, global = true)]
    show_project: bool,

    /// Let delete_instances proceed while volumes are still attached
    #[arg(short = 'i', long, global = true)]
    ignore_attached_volumes: bool,

    /// AWS region, overriding the configured one
    #[arg(long, global = true, env = "SKYFLEET_AWS_REGION")]
    region: Option<String>,
}

#[derive(Args)]
struct Targets {
    /// Instance names: a comma-separated list, `*` wildcards allowed
    targets: String,
}

#[derive(Subcommand)]
#[command(rename_all = "snake_case")]
enum Commands {
    /// List deployments found in the cloud, with resource counts
    ListDeployments,
    /// List every resource of this project's deployment
    ListDeploymentResources,

    /// Allocate the bastion and NAT gateway floating IPs
    CreateFloatingIps,
    /// Release the floating IPs
    DeleteFloatingIps,
    /// Create the VPC, subnets, gateways and routes
    CreateNetworking,
    /// Delete the VPC and everything networking in it
    DeleteNetworking,
    /// Create security groups and their rules
    CreateSecurityGroups,
    /// Delete security groups
    DeleteSecurityGroups,

    /// Create instances
    CreateInstances(Targets),
    /// Create instances from their snapshot images
    CreateInstancesFromSnapshotImages(Targets),
    /// Terminate instances
    DeleteInstances(Targets),
    /// Stop instances and bake snapshot images of them
    CreateSnapshotImages(Targets),
    /// Deregister snapshot images and delete their snapshots
    DeleteSnapshotImages(Targets),
    /// Check instances answer over SSH
    PingInstances(Targets),
    /// Run install scripts
    InstallServices(Targets),
    /// Run config scripts
    ConfigServices(Targets),
    /// Run start scripts
    StartServices(Targets),
    /// Run stop scripts
    StopServices(Targets),

    /// Create the volumes of the given instances
    CreateVolumes(Targets),
    /// Attach, format and mount the volumes of the given instances
    AttachVolumes(Targets),
    /// Unmount and detach the volumes of the given instances
    DetachVolumes(Targets),
    /// Delete the volumes of the given instances
    DeleteVolumes(Targets),

    /// Check every cassandra node joined the cluster
    CheckCassandraStatus,

    /// Create the whole deployment and configure all services
    DeploymentCreate,
    /// Stop services, snapshot every instance, then delete the instances
    DeploymentCreateImages,
    /// Bring instances back from their snapshot images
    DeploymentRestoreInstances,
    /// Delete all snapshot images
    DeploymentDeleteImages,
    /// Tear the whole deployment down
    DeploymentDelete,
}

impl Commands {
    fn resolve(&self) -> (Command, &str) {
        match self {
            Commands::ListDeployments => (Command::ListDeployments, ""),
            Commands::ListDeploymentResources => (Command::ListDeploymentResources, ""),
            Commands::CreateFloatingIps => (Command::CreateFloatingIps, ""),
            Commands::DeleteFloatingIps => (Command::DeleteFloatingIps, ""),
            Commands::CreateNetworking => (Command::CreateNetworking, ""),
            Commands::DeleteNetworking => (Command::DeleteNetworking, ""),
            Commands::CreateSecurityGroups => (Command::CreateSecurityGroups, ""),
            Commands::DeleteSecurityGroups => (Command::DeleteSecurityGroups, ""),
            Commands::CreateInstances(t) => (Command::CreateInstances, &t.targets),
            Commands::CreateInstancesFromSnapshotImages(t) => {
                (Command::CreateInstancesFromSnapshotImages, &t.targets)
            }
            Commands::DeleteInstances(t) => (Command::DeleteInstances, &t.targets),
            Commands::CreateSnapshotImages(t) => (Command::CreateSnapshotImages, &t.targets),
            Commands::DeleteSnapshotImages(t) => (Command::DeleteSnapshotImages, &t.targets),
            Commands::PingInstances(t) => (Command::PingInstances, &t.targets),
            Commands::InstallServices(t) => (Command::InstallServices, &t.targets),
            Commands::ConfigServices(t) => (Command::ConfigServices, &t.targets),
            Commands::StartServices(t) => (Command::StartServices, &t.targets),
            Commands::StopServices(t) => (Command::StopServices, &t.targets),
            Commands::CreateVolumes(t) => (Command::CreateVolumes, &t.targets),
            Commands::AttachVolumes(t) => (Command::AttachVolumes, &t.targets),
            Commands::DetachVolumes(t) => (Command::DetachVolumes, &t.targets),
            Commands::DeleteVolumes(t) => (Command::DeleteVolumes, &t.targets),
            Commands::CheckCassandraStatus => (Command::CheckCassandraStatus, ""),
            Commands::DeploymentCreate => (Command::DeploymentCreate, ""),
            Commands::DeploymentCreateImages => (Command::DeploymentCreateImages, ""),
            Commands::DeploymentRestoreInstances => (Command::DeploymentRestoreInstances, ""),
            Commands::DeploymentDeleteImages => (Command::DeploymentDeleteImages, ""),
            Commands::DeploymentDelete => (Command::DeploymentDelete, ""),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,skyfleet=debug,skyfleet_core=debug,skyfleet_cloud=debug,skyfleet_cloud_aws=debug,skyfleet_remote=debug,skyfleet_deploy=debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let started = Instant::now();
    let (command, targets) = cli.command.resolve();

    // Every command needs the project, listing included: it names the deployment
    let project = skyfleet_core::load_project(&cli.project)
        .with_context(|| format!("cannot load project {}", cli.project.display()))?;

    let client: Arc<dyn CloudClient> = Arc::new(AwsClient::from_env(cli.region.clone()).await);
    let reconciler = Reconciler::new(client, project.deployment_name.clone());

    let options = DeployOptions {
        verbose: cli.verbose,
        ping_repetitions: cli.ping_repetitions,
        ignore_attached_volumes: cli.ignore_attached_volumes,
        ..DeployOptions::default()
    };
    let executor = Executor::new(
        Throttle::new(options.throttle_period),
        Arc::new(ConsoleReporter),
    )
    .with_max_workers(options.max_workers);

    let mut deployer = Deployer::new(
        project,
        reconciler,
        Arc::new(OpenSshShellFactory),
        executor,
        options,
    );
    let result = deployer.run(command, targets).await;

    if cli.show_project {
        println!("{}", serde_json::to_string_pretty(deployer.project())?);
    }

    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok(()) => {
            println!("{} {}, elapsed {:.3}s", command, "OK".green(), elapsed);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}: {}", command, "FAILED".red(), e.to_string().red());
            eprintln!("elapsed {:.3}s", elapsed);
            std::process::exit(1);
        }
    }
}
