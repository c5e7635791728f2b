//! Profile management commands.
//!
//! Provides commands to list, show, copy, and delete stream profiles.

use clap::{Args, Subcommand};
use flowstream::BufferAttr;
use flowstream_config::{
    StreamProfile, ensure_user_profiles_dir, factory_profiles, is_factory_profile,
    list_system_profiles, list_user_profiles, load_profile, profile_name_from_path, system_profiles_dir,
    user_profiles_dir,
};
use std::path::PathBuf;

#[derive(Args)]
pub struct ProfilesArgs {
    #[command(subcommand)]
    command: ProfilesCommand,
}

#[derive(Subcommand)]
enum ProfilesCommand {
    /// List available profiles (factory, user and system)
    List {
        /// Show only factory profiles
        #[arg(long)]
        factory: bool,

        /// Show only user and system profiles
        #[arg(long)]
        user: bool,
    },

    /// Show details of a profile
    Show {
        /// Profile name or path
        name: String,

        /// Print the profile as TOML
        #[arg(long)]
        toml: bool,
    },

    /// Copy a profile to user profiles for customization
    Copy {
        /// Profile name or path
        source: String,

        /// New profile name (uses the source name if not specified)
        #[arg(short, long)]
        name: Option<String>,

        /// Overwrite if the profile already exists
        #[arg(long)]
        force: bool,
    },

    /// Delete a user profile
    Delete {
        /// Profile name to delete
        name: String,

        /// Confirm the deletion
        #[arg(long)]
        force: bool,
    },

    /// Show profile directories
    Paths,
}

pub fn run(args: ProfilesArgs) -> anyhow::Result<()> {
    match args.command {
        ProfilesCommand::List { factory, user } => list_profiles(factory, user),
        ProfilesCommand::Show { name, toml } => show_profile(&name, toml),
        ProfilesCommand::Copy { source, name, force } => copy_profile(&source, name.as_deref(), force),
        ProfilesCommand::Delete { name, force } => delete_profile(&name, force),
        ProfilesCommand::Paths => show_paths(),
    }
}

fn list_profiles(factory_only: bool, user_only: bool) -> anyhow::Result<()> {
    if !user_only {
        println!("Factory Profiles:");
        println!("=================");
        for profile in factory_profiles() {
            let desc = profile.description.as_deref().unwrap_or("");
            println!("  {:16} - {}", profile.name, desc);
        }
        println!();
    }

    if !factory_only {
        println!("User Profiles:");
        println!("==============");
        let files: Vec<PathBuf> = list_user_profiles().into_iter().chain(list_system_profiles()).collect();
        if files.is_empty() {
            println!("  (none)");
            println!();
            println!("  Start from a factory profile with: flowstream profiles copy <name> --name <new>\n");
        } else {
            for path in files {
                let name = profile_name_from_path(&path).unwrap_or_else(|| "unknown".to_string());
                match StreamProfile::load(&path) {
                    Ok(profile) => {
                        let desc = profile.description.as_deref().unwrap_or("");
                        println!("  {:16} - {}", name, desc);
                    }
                    Err(_) => println!("  {:16} - (error loading)", name),
                }
            }
            println!();
        }
    }

    Ok(())
}

fn show_profile(name: &str, as_toml: bool) -> anyhow::Result<()> {
    let profile = load_profile(name)?;
    if as_toml {
        print!("{}", profile.to_toml()?);
        return Ok(());
    }

    println!("Profile: {}", profile.name);
    println!("{}", "=".repeat(9 + profile.name.len()));
    println!();

    if let Some(desc) = &profile.description {
        println!("Description: {desc}");
        println!();
    }

    let resolved = profile.resolve()?;
    let options = &resolved.options;
    let connect = &resolved.connect;

    println!("Sample spec: {}", options.spec);
    println!("Direction:   {}", connect.direction);
    println!("Device:      {}", connect.device.as_deref().unwrap_or("(default)"));
    if options.latency_usec == 0 {
        println!("Latency:     (transport default)");
    } else {
        println!(
            "Latency:     {}us ({} bytes)",
            options.latency_usec,
            options.spec.usec_to_bytes(options.latency_usec)
        );
    }
    println!("Flags:       {}", connect.flags);
    println!(
        "Buffer:      {}",
        BufferAttr::for_connect(connect.direction, options.latency_usec, &options.spec)
    );

    Ok(())
}

fn copy_profile(source: &str, new_name: Option<&str>, force: bool) -> anyhow::Result<()> {
    let mut profile = load_profile(source)?;
    let target_name = new_name.unwrap_or(&profile.name).to_string();

    let dir = ensure_user_profiles_dir()?;
    let path = dir.join(format!("{target_name}.toml"));
    if path.exists() && !force {
        anyhow::bail!("Profile '{target_name}' already exists in user profiles. Use --force to overwrite.");
    }

    if let Some(desc) = profile.description.take() {
        profile.description = Some(format!("{desc} (copy)"));
    }
    profile.name = target_name.clone();
    profile.save(&path)?;

    println!("Copied profile '{source}' to user profile '{target_name}'");
    println!("Path: {}", path.display());
    Ok(())
}

fn delete_profile(name: &str, force: bool) -> anyhow::Result<()> {
    if is_factory_profile(name) {
        anyhow::bail!("Cannot delete factory profile '{name}'. Factory profiles are built-in.");
    }

    let path = user_profiles_dir().join(format!("{name}.toml"));
    if !path.exists() {
        anyhow::bail!("User profile '{name}' not found.");
    }
    if !force {
        anyhow::bail!("Use --force to confirm deletion of profile '{name}'.");
    }

    std::fs::remove_file(&path)?;
    println!("Deleted profile '{name}'.");
    Ok(())
}

fn show_paths() -> anyhow::Result<()> {
    println!("Profile Directories:");
    println!("====================");
    println!();
    println!("User profiles:   {}", user_profiles_dir().display());
    println!("System profiles: {}", system_profiles_dir().display());
    Ok(())
}
