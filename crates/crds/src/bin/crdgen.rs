//! Prints the Controller CustomResourceDefinition as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > controller-crd.yaml`

use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = crds::Controller::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
