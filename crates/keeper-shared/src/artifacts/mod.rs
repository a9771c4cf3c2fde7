use libc::pid_t;
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;

mod reap_report;

pub use reap_report::*;

/// Persistence of monitor results as MessagePack files
pub trait ArtifactExt
where
    Self: Sized + Serialize + DeserializeOwned,
{
    /// WARNING: This doesn't support generic types
    fn name() -> &'static str {
        let type_name = std::any::type_name::<Self>();
        type_name.rsplit("::").next().unwrap_or(type_name)
    }

    fn encode_to_writer<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        let encoded = rmp_serde::to_vec_named(self)?;
        writer.write_all(&encoded)?;
        Ok(())
    }

    fn decode_from_reader<R: std::io::Read>(reader: R) -> anyhow::Result<Self> {
        Ok(rmp_serde::from_read(reader)?)
    }

    fn save_file_to<P: AsRef<std::path::Path>>(
        &self,
        folder: P,
        filename: &str,
    ) -> anyhow::Result<std::path::PathBuf> {
        std::fs::create_dir_all(folder.as_ref())?;
        let path = folder.as_ref().join(filename);
        let file = std::fs::File::create(&path)?;
        self.encode_to_writer(file)?;

        debug!("Saved {} to {}", Self::name(), path.display());
        Ok(path)
    }

    fn file_name_with_pid(pid: pid_t) -> String {
        format!("{pid}.{}.msgpack", Self::name())
    }

    fn save_with_pid_to<P: AsRef<std::path::Path>>(
        &self,
        folder: P,
        pid: pid_t,
    ) -> anyhow::Result<std::path::PathBuf> {
        self.save_file_to(folder, &Self::file_name_with_pid(pid))
    }

    fn load_from<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::decode_from_reader(std::io::BufReader::new(file))
    }
}
