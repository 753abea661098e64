//! Parsing for the kernel mount table (`/proc/mounts` format).

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
}

pub fn parse_mounts(data: &str) -> Vec<MountEntry> {
    let mut entries = Vec::new();
    for line in data.lines() {
        let mut parts = line.split_whitespace();
        let device = match parts.next() {
            Some(value) => unescape_mount(value),
            None => continue,
        };
        let mount_point = match parts.next() {
            Some(value) => unescape_mount(value),
            None => continue,
        };
        let fs_type = match parts.next() {
            Some(value) => value.to_string(),
            None => continue,
        };
        entries.push(MountEntry {
            device,
            mount_point,
            fs_type,
        });
    }
    entries
}

/// Device-mapper name for a logical volume: hyphens inside either name are
/// doubled, then the two are joined with a single hyphen.
pub fn mapper_path(vg_name: &str, lv_name: &str) -> String {
    format!(
        "/dev/mapper/{}-{}",
        vg_name.replace('-', "--"),
        lv_name.replace('-', "--")
    )
}

/// Decodes the `\ooo` octal escapes the kernel uses for whitespace.
pub fn unescape_mount(value: &str) -> String {
    let mut output = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'\\' && index + 4 <= bytes.len() {
            let digits = &bytes[index + 1..index + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    output.push(byte);
                    index += 4;
                    continue;
                }
            }
        }
        output.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&output).to_string()
}
