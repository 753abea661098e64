use crate::Host;
use diskstrap_core::ProvisionError;

/// Logical volume size as `lvcreate` understands it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LvSize {
    /// Percentage form such as `100%VG` or `80%FREE`, passed with `-l`.
    Extents(String),
    /// Absolute size such as `50G`, passed with `-L`.
    Absolute(String),
}

impl LvSize {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.contains('%') {
            LvSize::Extents(value.to_string())
        } else {
            LvSize::Absolute(value.to_string())
        }
    }

    fn flag(&self) -> &'static str {
        match self {
            LvSize::Extents(_) => "-l",
            LvSize::Absolute(_) => "-L",
        }
    }

    fn value(&self) -> &str {
        match self {
            LvSize::Extents(value) | LvSize::Absolute(value) => value,
        }
    }
}

/// Physical volume on `partition`, volume group `vg_name` on top of it and a
/// logical volume `lv_name` of `lv_size`. Returns `/dev/<vg>/<lv>`.
///
/// A failure leaves whatever was already created in place.
pub fn setup_lvm(
    host: &Host<'_>,
    partition: &str,
    vg_name: &str,
    lv_name: &str,
    lv_size: &str,
) -> Result<String, ProvisionError> {
    tracing::info!(partition, "creating physical volume");
    host.require(&host.root("pvcreate").args(["-y", partition]))?;

    tracing::info!(vg = vg_name, "creating volume group");
    host.require(&host.root("vgcreate").args([vg_name, partition]))?;

    let size = LvSize::parse(lv_size);
    tracing::info!(lv = lv_name, size = size.value(), "creating logical volume");
    host.require(&host.root("lvcreate").args([
        "-y",
        size.flag(),
        size.value(),
        "-n",
        lv_name,
        vg_name,
    ]))?;

    Ok(format!("/dev/{}/{}", vg_name, lv_name))
}
