//! Device-description directory ingestion. A description file declares a device's type, its sync
//! managers, and its default parameter-object mapping; a slave without a matching description is
//! still usable with master-supplied defaults (non-fatal absence).

use crate::slave::{ParameterObject, SyncManagerDirection};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DeviceDescriptionError {
    #[error("malformed device description XML: {0}")]
    Xml(String),
    #[error("device description has no <Device> element")]
    MissingDeviceElement,
}

/// A sync manager's default direction and length, as declared by a description file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncManagerDescription {
    pub index: u8,
    pub direction: SyncManagerDirection,
    pub default_length: u16,
}

/// One device's parsed description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub type_name: heapless::String<64>,
    pub product_revision: Option<u32>,
    pub sync_managers: heapless::Vec<SyncManagerDescription, 16>,
    pub default_parameter_objects: heapless::Vec<ParameterObject, 64>,
}

/// Parse one `<Device>...</Device>` description document.
pub fn parse(xml: &str) -> Result<DeviceDescription, DeviceDescriptionError> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| DeviceDescriptionError::Xml(e.to_string()))?;

    let device = doc
        .descendants()
        .find(|n| n.has_tag_name("Device"))
        .ok_or(DeviceDescriptionError::MissingDeviceElement)?;

    let mut type_name = heapless::String::new();
    let mut product_revision = None;
    let mut sync_managers = heapless::Vec::new();
    let mut default_parameter_objects = heapless::Vec::new();

    for child in device.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "Type" => {
                if let Some(text) = child.text() {
                    let _ = type_name.push_str(text.trim());
                }
                product_revision = child
                    .attribute("ProductRevision")
                    .and_then(|v| v.parse().ok());
            }
            "Sm" => {
                if let Some(sm) = parse_sync_manager(child, sync_managers.len() as u8) {
                    let _ = sync_managers.push(sm);
                }
            }
            "TxPdo" | "RxPdo" => {
                for entry in child.children().filter(|n| n.has_tag_name("Entry")) {
                    if let Some(object) = parse_parameter_object(entry) {
                        let _ = default_parameter_objects.push(object);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(DeviceDescription {
        type_name,
        product_revision,
        sync_managers,
        default_parameter_objects,
    })
}

fn parse_sync_manager(node: roxmltree::Node, fallback_index: u8) -> Option<SyncManagerDescription> {
    let index = node
        .attribute("Index")
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback_index);

    let direction = match node.attribute("ControlByte").or_else(|| node.text()) {
        Some(v) if v.trim() == "1" => SyncManagerDirection::MasterIn,
        _ => SyncManagerDirection::MasterOut,
    };

    let default_length = node
        .attribute("DefaultSize")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    Some(SyncManagerDescription {
        index,
        direction,
        default_length,
    })
}

fn parse_parameter_object(node: roxmltree::Node) -> Option<ParameterObject> {
    let index = node
        .children()
        .find(|n| n.has_tag_name("Index"))
        .and_then(|n| n.text())
        .and_then(|v| parse_hex_or_decimal(v.trim()))?;

    let subindex = node
        .children()
        .find(|n| n.has_tag_name("SubIndex"))
        .and_then(|n| n.text())
        .and_then(|v| parse_hex_or_decimal(v.trim()))
        .unwrap_or(0) as u8;

    let bit_length = node
        .children()
        .find(|n| n.has_tag_name("BitLen"))
        .and_then(|n| n.text())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0);

    Some(ParameterObject {
        index: index as u16,
        subindex,
        bit_length,
    })
}

fn parse_hex_or_decimal(s: &str) -> Option<u32> {
    s.strip_prefix("#x")
        .or_else(|| s.strip_prefix("0x"))
        .map_or_else(|| s.parse().ok(), |hex| u32::from_str_radix(hex, 16).ok())
}

/// Load every `*.xml` file in `dir`, skipping (and logging) any that fail to parse; an empty or
/// missing directory simply yields no descriptions, since absence of a matching description is
/// non-fatal.
pub fn load_directory(dir: &std::path::Path) -> Vec<DeviceDescription> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "xml"))
        .filter_map(|entry| std::fs::read_to_string(entry.path()).ok())
        .filter_map(|contents| match parse(&contents) {
            Ok(description) => Some(description),
            Err(err) => {
                crate::fmt::warn!("skipping malformed device description: {}", err);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <Device>
            <Type ProductRevision="0x00010001">ServoDrive</Type>
            <Sm Index="0" ControlByte="0">0</Sm>
            <Sm Index="1" ControlByte="1">0</Sm>
            <TxPdo>
                <Entry>
                    <Index>#x6000</Index>
                    <SubIndex>1</SubIndex>
                    <BitLen>8</BitLen>
                </Entry>
            </TxPdo>
        </Device>
    "#;

    #[test]
    fn parses_type_and_revision() {
        let description = parse(SAMPLE).unwrap();
        assert_eq!(description.type_name.as_str(), "ServoDrive");
        assert_eq!(description.product_revision, Some(0x0001_0001));
    }

    #[test]
    fn parses_sync_managers_and_default_mapping() {
        let description = parse(SAMPLE).unwrap();
        assert_eq!(description.sync_managers.len(), 2);
        assert_eq!(description.sync_managers[1].direction, SyncManagerDirection::MasterIn);

        assert_eq!(description.default_parameter_objects.len(), 1);
        assert_eq!(description.default_parameter_objects[0].index, 0x6000);
        assert_eq!(description.default_parameter_objects[0].bit_length, 8);
    }

    #[test]
    fn missing_device_element_is_an_error() {
        assert_eq!(
            parse("<Root/>"),
            Err(DeviceDescriptionError::MissingDeviceElement)
        );
    }
}
