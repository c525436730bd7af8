//! Create-domain command
//!
//! Scaffolds a declaration file in the two-level `{domain}/{environment}`
//! layout. The next deploy picks it up; nothing is provisioned here.

use std::path::Path;

use clap::Args;
use stratus::catalog::{validate_domain_name, DomainDeclaration, DECLARATION_FILE_NAME};

use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct CreateDomainArgs {
    /// Fully qualified domain name (e.g., "example.com")
    pub name: String,

    /// Environment to declare the domain in
    #[arg(long, default_value = "production")]
    pub environment: String,

    /// Provision a registrar-level registration record
    #[arg(long)]
    pub register: bool,

    /// Mistaken spelling redirected to this domain (repeatable)
    #[arg(long = "typo")]
    pub typos: Vec<String>,
}

pub fn run(args: CreateDomainArgs, config_path: &Path) -> Result<()> {
    let config = super::load_config(config_path)?;

    validate_domain_name(&args.name)?;
    for typo in &args.typos {
        validate_domain_name(typo)?;
        if typo == &args.name {
            return Err(Error::validation(
                "typo list must not contain the domain itself",
            ));
        }
    }

    let dir = config.domains_root.join(&args.name).join(&args.environment);
    let path = dir.join(DECLARATION_FILE_NAME);
    if path.exists() {
        return Err(Error::DomainExists { path });
    }

    let declaration = DomainDeclaration {
        domain: args.name.clone(),
        register: args.register,
        typos: args.typos,
    };

    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, serde_yaml::to_string(&declaration)?)?;

    println!("Created {}", path.display());
    println!("Run 'stratus deploy' to provision it.");
    Ok(())
}
