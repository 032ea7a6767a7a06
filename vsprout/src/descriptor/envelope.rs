//! Envelope Assembler.
//!
//! Wraps one or more virtual-system descriptors plus disk and network
//! metadata into the complete namespaced document consumed by the import
//! API. Serialization is pure and deterministic: identical sequences of
//! builder calls yield byte-identical output.

use super::hardware::VirtualSystem;
use super::xml::{Element, QName, Xmlns};

/// Symbolic reference to a file carried alongside the descriptor.
#[derive(Clone, Debug)]
struct FileRef {
    href: String,
    id: String,
    size: u64,
}

/// One disk entry bound to a file reference.
#[derive(Clone, Debug)]
struct DiskEntry {
    capacity: u64,
    allocation_units: String,
    disk_id: String,
    file_ref: String,
    format: String,
}

/// The full import document under construction.
#[derive(Debug, Default)]
pub struct Envelope {
    files: Vec<FileRef>,
    disks: Vec<DiskEntry>,
    networks: Vec<String>,
    systems: Vec<VirtualSystem>,
}

impl Envelope {
    /// Empty envelope with placeholders for file references, disk metadata,
    /// and networks.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file_reference(
        &mut self,
        href: impl Into<String>,
        reference_id: impl Into<String>,
        size: u64,
    ) {
        self.files.push(FileRef {
            href: href.into(),
            id: reference_id.into(),
            size,
        });
    }

    pub fn add_disk(
        &mut self,
        capacity: u64,
        allocation_units: impl Into<String>,
        disk_id: impl Into<String>,
        file_ref: impl Into<String>,
        format: impl Into<String>,
    ) {
        self.disks.push(DiskEntry {
            capacity,
            allocation_units: allocation_units.into(),
            disk_id: disk_id.into(),
            file_ref: file_ref.into(),
            format: format.into(),
        });
    }

    pub fn add_network(&mut self, name: impl Into<String>) {
        self.networks.push(name.into());
    }

    /// Create a new virtual system and return its bound hardware builder.
    pub fn add_virtual_system(&mut self, name: impl Into<String>) -> &mut VirtualSystem {
        self.systems.push(VirtualSystem::new(name));
        // just pushed
        self.systems.last_mut().unwrap()
    }

    /// Render the document. Hardware-item children are reordered
    /// lexicographically by qualified tag name, a requirement of the import
    /// API that is independent of construction order.
    pub fn serialize(&self) -> String {
        let mut root = Element::new(QName::plain("Envelope"));

        let mut references = Element::new(QName::plain("References"));
        for file in &self.files {
            references.push(
                Element::new(QName::plain("File"))
                    .attr(QName::ns(Xmlns::Ovf, "href"), &file.href)
                    .attr(QName::ns(Xmlns::Ovf, "id"), &file.id)
                    .attr(QName::ns(Xmlns::Ovf, "size"), file.size.to_string()),
            );
        }
        root.push(references);

        let mut disk_section = Element::new(QName::plain("DiskSection"));
        disk_section.push(Element::new(QName::plain("Info")).text("Virtual disk information"));
        for disk in &self.disks {
            disk_section.push(
                Element::new(QName::plain("Disk"))
                    .attr(QName::ns(Xmlns::Ovf, "capacity"), disk.capacity.to_string())
                    .attr(
                        QName::ns(Xmlns::Ovf, "capacityAllocationUnits"),
                        &disk.allocation_units,
                    )
                    .attr(QName::ns(Xmlns::Ovf, "diskId"), &disk.disk_id)
                    .attr(QName::ns(Xmlns::Ovf, "fileRef"), &disk.file_ref)
                    .attr(QName::ns(Xmlns::Ovf, "format"), &disk.format),
            );
        }
        root.push(disk_section);

        let mut network_section = Element::new(QName::plain("NetworkSection"));
        network_section.push(Element::new(QName::plain("Info")).text("The list of logical networks"));
        for network in &self.networks {
            network_section.push(
                Element::new(QName::plain("Network"))
                    .attr(QName::ns(Xmlns::Ovf, "name"), network)
                    .child(
                        Element::new(QName::plain("Description"))
                            .text(format!("The {network} network")),
                    ),
            );
        }
        root.push(network_section);

        for system in &self.systems {
            let mut vs = Element::new(QName::plain("VirtualSystem"))
                .attr(QName::ns(Xmlns::Ovf, "id"), &system.name);
            vs.push(Element::new(QName::plain("Info")).text("A virtual machine"));
            vs.push(Element::new(QName::plain("Name")).text(&system.name));
            if let Some(os) = &system.os {
                vs.push(
                    Element::new(QName::plain("OperatingSystemSection"))
                        .attr(QName::ns(Xmlns::Ovf, "id"), os.id.to_string())
                        .attr(QName::ns(Xmlns::Vmw, "osType"), &os.os_type)
                        .child(
                            Element::new(QName::plain("Info"))
                                .text("The kind of installed guest operating system"),
                        ),
                );
            }
            vs.push(system.hardware_section());
            root.push(vs);
        }

        root.into_document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        let mut envelope = Envelope::new();
        envelope.add_file_reference("disk-1.vmdk", "file1", 0);
        envelope.add_disk(
            10240,
            "byte * 2^20",
            "vmdisk1",
            "file1",
            "http://www.vmware.com/interfaces/specifications/vmdk.html#streamOptimized",
        );
        envelope.add_network("lan");

        let system = envelope.add_virtual_system("node");
        system.add_operating_system(100, "other3xLinux64Guest");
        system.add_system("node", "vmx-11");
        system.add_vcpus(2);
        system.add_memory(1024);
        let scsi = system.add_scsi_controller(0);
        system.add_hard_disk(scsi, 0, "ovf:/disk/vmdisk1", false, None);
        system.add_ethernet("lan", "VmxNet3", true);
        envelope
    }

    #[test]
    fn test_identical_call_sequences_serialize_identically() {
        assert_eq!(sample().serialize(), sample().serialize());
    }

    #[test]
    fn test_document_shape() {
        let xml = sample().serialize();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<Envelope "));
        assert!(xml.contains("<References>"));
        assert!(xml.contains(
            "<File ovf:href=\"disk-1.vmdk\" ovf:id=\"file1\" ovf:size=\"0\"/>"
        ));
        assert!(xml.contains("ovf:capacity=\"10240\""));
        assert!(xml.contains("<Network ovf:name=\"lan\">"));
        assert!(xml.contains("<VirtualSystem ovf:id=\"node\">"));
        assert!(xml.contains("vmw:osType=\"other3xLinux64Guest\""));
        assert!(xml.contains("<vssd:VirtualSystemType>vmx-11</vssd:VirtualSystemType>"));
        assert!(xml.ends_with("</Envelope>\n"));
    }

    #[test]
    fn test_item_children_sorted_by_qualified_name() {
        let xml = sample().serialize();

        // Within each <Item>...</Item> block, qualified child tags must be
        // non-decreasing by (namespace URI, local name). rasd:* sorts before
        // vmw:* because the schemas.dmtf.org URI precedes www.vmware.com.
        let mut in_item = false;
        let mut last: Option<(usize, String)> = None;
        for line in xml.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("<Item") {
                in_item = true;
                last = None;
                continue;
            }
            if trimmed.starts_with("</Item") {
                in_item = false;
                continue;
            }
            if !in_item {
                continue;
            }
            let tag: String = trimmed
                .trim_start_matches('<')
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == ':')
                .collect();
            let rank = if tag.starts_with("rasd:") {
                0
            } else if tag.starts_with("vmw:") {
                1
            } else {
                panic!("unexpected child in hardware item: {tag}");
            };
            let key = (rank, tag.clone());
            if let Some(prev) = &last {
                assert!(*prev <= key, "{prev:?} appeared before {key:?}");
            }
            last = Some(key);
        }
    }

    #[test]
    fn test_ethernet_description_quotes_connection() {
        let xml = sample().serialize();
        assert!(xml.contains(
            "<rasd:Description>VmxNet3 ethernet adapter on &quot;lan&quot;</rasd:Description>"
        ));
    }
}
