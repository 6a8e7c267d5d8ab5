use kube::CustomResourceExt;
use logstorage_operator::crd::LogStorage;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&LogStorage::crd())?);
    Ok(())
}
