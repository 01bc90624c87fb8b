// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Generates the `k8sio.auth/v1` CRD manifests from the Rust types in
//! src/crd.rs into deploy/crds/.
//!
//! Usage:
//!   cargo run --bin crdgen

use k8s_iam_operator::crd::{Group, IamClusterRole, IamRole, User};
use kube::CustomResourceExt;
use std::fs;
use std::path::Path;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = Path::new("deploy/crds");
    fs::create_dir_all(output_dir)?;

    println!("Generating CRD YAML files from src/crd.rs...");

    generate_crd::<User>("users.crd.yaml", output_dir)?;
    generate_crd::<Group>("groups.crd.yaml", output_dir)?;
    generate_crd::<IamRole>("roles.crd.yaml", output_dir)?;
    generate_crd::<IamClusterRole>("clusterroles.crd.yaml", output_dir)?;

    println!("✓ Successfully generated CRD YAML files in deploy/crds/");
    println!("\nApply with: kubectl apply -f deploy/crds/");

    Ok(())
}

fn generate_crd<T>(filename: &str, output_dir: &Path) -> Result<(), Box<dyn std::error::Error>>
where
    T: CustomResourceExt,
{
    let yaml = serde_yaml::to_string(&T::crd())?;
    let content = format!("{COPYRIGHT_HEADER}{yaml}");

    fs::write(output_dir.join(filename), content)?;
    println!("  ✓ Generated {filename}");

    Ok(())
}
