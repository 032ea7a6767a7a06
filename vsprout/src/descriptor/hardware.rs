//! Hardware Descriptor Builder.
//!
//! One constructor per hardware category. Each call appends one item to the
//! virtual system, assigns it the next instance id, and returns that id so
//! the caller can reference it as a `Parent` for attached devices (a SCSI
//! controller's id becomes the parent of a hard disk). The builder does not
//! validate parent references; that is the caller's contract.
//!
//! Counters are owned by one construction session: instance ids are assigned
//! strictly in call order from 0, while the per-category display numbers
//! (CD-ROM, hard disk, floppy, NIC) each count from 1 independently.

use super::xml::{Element, QName, Xmlns};

/// NIC `AddressOnParent` values start here; the low address range is
/// reserved by platform convention.
const NIC_ADDRESS_OFFSET: u32 = 7;

/// Identifier of one hardware item, unique within its virtual system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u32);

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CIM resource-type codes understood by the import API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Other,
    Processor,
    Memory,
    IdeController,
    ScsiController,
    EthernetAdapter,
    FloppyDrive,
    CdRom,
    DiskDrive,
    SataController,
    UsbController,
    VideoCard,
}

impl ResourceKind {
    pub fn code(self) -> u32 {
        match self {
            ResourceKind::Other => 1,
            ResourceKind::Processor => 3,
            ResourceKind::Memory => 4,
            ResourceKind::IdeController => 5,
            ResourceKind::ScsiController => 6,
            ResourceKind::EthernetAdapter => 10,
            ResourceKind::FloppyDrive => 14,
            ResourceKind::CdRom => 15,
            ResourceKind::DiskDrive => 17,
            ResourceKind::SataController => 20,
            ResourceKind::UsbController => 23,
            ResourceKind::VideoCard => 24,
        }
    }
}

/// Typed setting-data fields of a hardware item.
#[derive(Clone, Debug)]
enum Field {
    Address(u32),
    AddressOnParent(u32),
    AllocationUnits(&'static str),
    AutomaticAllocation(bool),
    Connection(String),
    CoresPerSocket(u32),
    Description(String),
    HostResource(String),
    Parent(InstanceId),
    ResourceSubType(String),
    VirtualQuantity(u64),
}

impl Field {
    fn to_element(&self) -> Element {
        match self {
            Field::Address(v) => rasd("Address", v.to_string()),
            Field::AddressOnParent(v) => rasd("AddressOnParent", v.to_string()),
            Field::AllocationUnits(v) => rasd("AllocationUnits", *v),
            Field::AutomaticAllocation(v) => rasd("AutomaticAllocation", bool_str(*v)),
            Field::Connection(v) => rasd("Connection", v.clone()),
            Field::CoresPerSocket(v) => Element::new(QName::ns(Xmlns::Vmw, "CoresPerSocket"))
                .attr(QName::ns(Xmlns::Ovf, "required"), "false")
                .text(v.to_string()),
            Field::Description(v) => rasd("Description", v.clone()),
            Field::HostResource(v) => rasd("HostResource", v.clone()),
            Field::Parent(v) => rasd("Parent", v.to_string()),
            Field::ResourceSubType(v) => rasd("ResourceSubType", v.clone()),
            Field::VirtualQuantity(v) => rasd("VirtualQuantity", v.to_string()),
        }
    }
}

fn rasd(local: &'static str, text: impl Into<String>) -> Element {
    Element::new(QName::ns(Xmlns::Rasd, local)).text(text)
}

/// Booleans are serialized as lowercase literal strings.
fn bool_str(v: bool) -> &'static str {
    if v { "true" } else { "false" }
}

/// Vendor-extension config entry (`vmw:Config`).
fn vendor_config(key: &str, value: &str) -> Element {
    Element::new(QName::ns(Xmlns::Vmw, "Config"))
        .attr(QName::ns(Xmlns::Ovf, "required"), "false")
        .attr(QName::ns(Xmlns::Vmw, "key"), key)
        .attr(QName::ns(Xmlns::Vmw, "value"), value)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ItemKind {
    /// vssd `System` record identifying the hardware family.
    System,
    /// rasd `Item` record describing one device.
    Item,
}

/// One namespace-qualified hardware record.
#[derive(Clone, Debug)]
pub struct HardwareItem {
    kind: ItemKind,
    element_name: String,
    instance_id: InstanceId,
    resource_type: Option<ResourceKind>,
    fields: Vec<Field>,
    vendor_config: Vec<(String, String)>,
    /// Emits `ovf:required="false"` when unset.
    required: bool,
    /// System identity fields (System records only).
    system_identity: Option<(String, String)>,
}

impl HardwareItem {
    pub(super) fn to_element(&self) -> Element {
        let (tag, ns) = match self.kind {
            ItemKind::System => ("System", Xmlns::Vssd),
            ItemKind::Item => ("Item", Xmlns::Rasd),
        };
        let mut element = Element::new(QName::plain(tag));
        if !self.required {
            element = element.attr(QName::ns(Xmlns::Ovf, "required"), "false");
        }
        element.push(Element::new(QName::ns(ns, "ElementName")).text(&self.element_name));
        element.push(Element::new(QName::ns(ns, "InstanceID")).text(self.instance_id.to_string()));
        if let Some(kind) = self.resource_type {
            element.push(rasd("ResourceType", kind.code().to_string()));
        }
        if let Some((name, family)) = &self.system_identity {
            element.push(Element::new(QName::ns(Xmlns::Vssd, "VirtualSystemIdentifier")).text(name));
            element.push(Element::new(QName::ns(Xmlns::Vssd, "VirtualSystemType")).text(family));
        }
        for field in &self.fields {
            element.push(field.to_element());
        }
        for (key, value) in &self.vendor_config {
            element.push(vendor_config(key, value));
        }
        element
    }
}

/// Operating-system section of a virtual system.
#[derive(Clone, Debug)]
pub(super) struct OsSection {
    pub(super) id: u32,
    pub(super) os_type: String,
}

/// One virtual system under construction: identity, OS tag, and the ordered
/// hardware items, plus the counters local to this session.
#[derive(Debug)]
pub struct VirtualSystem {
    pub(super) name: String,
    pub(super) os: Option<OsSection>,
    items: Vec<HardwareItem>,
    section_config: Vec<(String, String)>,
    next_instance_id: u32,
    num_cd_rom: u32,
    num_hard_disk: u32,
    num_floppy: u32,
    num_ethernet: u32,
    next_nic_address: u32,
}

impl VirtualSystem {
    pub(super) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            os: None,
            items: Vec::new(),
            section_config: Vec::new(),
            next_instance_id: 0,
            num_cd_rom: 1,
            num_hard_disk: 1,
            num_floppy: 1,
            num_ethernet: 1,
            next_nic_address: NIC_ADDRESS_OFFSET,
        }
    }

    fn next_instance_id(&mut self) -> InstanceId {
        let id = InstanceId(self.next_instance_id);
        self.next_instance_id += 1;
        id
    }

    fn add_item(
        &mut self,
        kind: ItemKind,
        element_name: String,
        resource_type: Option<ResourceKind>,
        required: bool,
    ) -> InstanceId {
        let instance_id = self.next_instance_id();
        self.items.push(HardwareItem {
            kind,
            element_name,
            instance_id,
            resource_type,
            fields: Vec::new(),
            vendor_config: Vec::new(),
            required,
            system_identity: None,
        });
        instance_id
    }

    fn last(&mut self) -> &mut HardwareItem {
        // add_item always pushes before this is called
        self.items.last_mut().unwrap()
    }

    /// Set the operating-system tag consumed by the platform.
    pub fn add_operating_system(&mut self, os_id: u32, os_type: impl Into<String>) {
        self.os = Some(OsSection {
            id: os_id,
            os_type: os_type.into(),
        });
    }

    /// Hardware-family identity record.
    pub fn add_system(
        &mut self,
        system_name: impl Into<String>,
        system_type: impl Into<String>,
    ) -> InstanceId {
        let id = self.add_item(
            ItemKind::System,
            "Virtual Hardware Family".to_string(),
            None,
            true,
        );
        self.last().system_identity = Some((system_name.into(), system_type.into()));
        id
    }

    pub fn add_vcpus(&mut self, num_vcpus: u32) -> InstanceId {
        let id = self.add_item(
            ItemKind::Item,
            format!("{num_vcpus} virtual CPU(s)"),
            Some(ResourceKind::Processor),
            true,
        );
        self.last().fields.extend([
            Field::AllocationUnits("hertz * 10^6"),
            Field::Description("Number of Virtual CPUs".to_string()),
            Field::VirtualQuantity(u64::from(num_vcpus)),
            Field::CoresPerSocket(num_vcpus),
        ]);
        id
    }

    pub fn add_memory(&mut self, memory_mb: u64) -> InstanceId {
        let id = self.add_item(
            ItemKind::Item,
            format!("{memory_mb}MB of memory"),
            Some(ResourceKind::Memory),
            true,
        );
        self.last().fields.extend([
            Field::AllocationUnits("byte * 2^20"),
            Field::Description("Memory Size".to_string()),
            Field::VirtualQuantity(memory_mb),
        ]);
        id
    }

    pub fn add_sata_controller(&mut self, address: u32) -> InstanceId {
        let id = self.add_item(
            ItemKind::Item,
            format!("SATA Controller {address}"),
            Some(ResourceKind::SataController),
            true,
        );
        self.last().fields.extend([
            Field::Address(address),
            Field::Description("SATA Controller".to_string()),
            Field::ResourceSubType("vmware.sata.ahci".to_string()),
        ]);
        id
    }

    pub fn add_scsi_controller(&mut self, address: u32) -> InstanceId {
        let id = self.add_item(
            ItemKind::Item,
            format!("SCSI Controller {address}"),
            Some(ResourceKind::ScsiController),
            true,
        );
        self.last().fields.extend([
            Field::Address(address),
            Field::Description("SCSI Controller".to_string()),
            Field::ResourceSubType("VirtualSCSI".to_string()),
        ]);
        id
    }

    pub fn add_usb_controller(&mut self, address: u32) -> InstanceId {
        let id = self.add_item(
            ItemKind::Item,
            "USB Controller".to_string(),
            Some(ResourceKind::UsbController),
            false,
        );
        self.last().fields.extend([
            Field::Address(address),
            Field::Description("USB Controller (EHCI)".to_string()),
            Field::ResourceSubType("vmware.usb.ehci".to_string()),
        ]);
        self.last().vendor_config.extend([
            ("autoConnectDevices".to_string(), "false".to_string()),
            ("ehciEnabled".to_string(), "true".to_string()),
        ]);
        id
    }

    pub fn add_ide_controller(&mut self, address: u32) -> InstanceId {
        let id = self.add_item(
            ItemKind::Item,
            format!("VirtualIDEController {address}"),
            Some(ResourceKind::IdeController),
            true,
        );
        self.last().fields.extend([
            Field::Address(address),
            Field::Description("IDE Controller".to_string()),
        ]);
        id
    }

    pub fn add_video_card(
        &mut self,
        enable_3d_support: bool,
        enable_mpt_support: bool,
        use_3d_renderer: &str,
        use_auto_detect: bool,
        video_ram_kb: u64,
    ) -> InstanceId {
        let id = self.add_item(
            ItemKind::Item,
            "VirtualVideoCard".to_string(),
            Some(ResourceKind::VideoCard),
            false,
        );
        self.last().fields.push(Field::AutomaticAllocation(false));
        self.last().vendor_config.extend([
            ("enable3DSupport".to_string(), bool_str(enable_3d_support).to_string()),
            ("enableMPTSupport".to_string(), bool_str(enable_mpt_support).to_string()),
            ("use3dRenderer".to_string(), use_3d_renderer.to_string()),
            ("useAutoDetect".to_string(), bool_str(use_auto_detect).to_string()),
            ("videoRamSizeInKB".to_string(), video_ram_kb.to_string()),
        ]);
        id
    }

    /// Platform interconnect device.
    pub fn add_vmci_device(&mut self, allow_unrestricted_communication: bool) -> InstanceId {
        let id = self.add_item(
            ItemKind::Item,
            "VirtualVMCIDevice".to_string(),
            Some(ResourceKind::Other),
            false,
        );
        self.last().fields.extend([
            Field::AutomaticAllocation(false),
            Field::ResourceSubType("vmware.vmci".to_string()),
        ]);
        self.last().vendor_config.push((
            "allowUnrestrictedCommunication".to_string(),
            bool_str(allow_unrestricted_communication).to_string(),
        ));
        id
    }

    pub fn add_cd_rom(&mut self, parent: InstanceId, address_on_parent: u32) -> InstanceId {
        let num = self.num_cd_rom;
        self.num_cd_rom += 1;
        let id = self.add_item(
            ItemKind::Item,
            format!("CD-ROM {num}"),
            Some(ResourceKind::CdRom),
            false,
        );
        self.last().fields.extend([
            Field::AddressOnParent(address_on_parent),
            Field::AutomaticAllocation(false),
            Field::ResourceSubType("vmware.cdrom.atapi".to_string()),
            Field::Parent(parent),
        ]);
        id
    }

    pub fn add_hard_disk(
        &mut self,
        parent: InstanceId,
        address_on_parent: u32,
        host_resource: impl Into<String>,
        write_through: bool,
        disk_mode: Option<&str>,
    ) -> InstanceId {
        let num = self.num_hard_disk;
        self.num_hard_disk += 1;
        let id = self.add_item(
            ItemKind::Item,
            format!("Hard Disk {num}"),
            Some(ResourceKind::DiskDrive),
            true,
        );
        self.last().fields.extend([
            Field::AddressOnParent(address_on_parent),
            Field::Parent(parent),
            Field::HostResource(host_resource.into()),
        ]);
        self.last().vendor_config.push((
            "backing.writeThrough".to_string(),
            bool_str(write_through).to_string(),
        ));
        if let Some(mode) = disk_mode {
            self.last()
                .vendor_config
                .push(("backing.diskMode".to_string(), mode.to_string()));
        }
        id
    }

    pub fn add_floppy_drive(&mut self, address_on_parent: u32) -> InstanceId {
        let num = self.num_floppy;
        self.num_floppy += 1;
        let id = self.add_item(
            ItemKind::Item,
            format!("Floppy {num}"),
            Some(ResourceKind::FloppyDrive),
            false,
        );
        self.last().fields.extend([
            Field::AddressOnParent(address_on_parent),
            Field::AutomaticAllocation(false),
            Field::Description("Floppy Drive".to_string()),
            Field::ResourceSubType("vmware.floppy.remotedevice".to_string()),
        ]);
        id
    }

    /// Ethernet adapter. `AddressOnParent` is assigned by the builder from
    /// the NIC address counter (7, 8, ...), independent of the display
    /// number.
    pub fn add_ethernet(
        &mut self,
        connection: impl Into<String>,
        adapter_type: &str,
        wake_on_lan: bool,
    ) -> InstanceId {
        let connection = connection.into();
        let num = self.num_ethernet;
        self.num_ethernet += 1;
        let address = self.next_nic_address;
        self.next_nic_address += 1;

        let id = self.add_item(
            ItemKind::Item,
            format!("Ethernet {num}"),
            Some(ResourceKind::EthernetAdapter),
            false,
        );
        self.last().fields.extend([
            Field::AddressOnParent(address),
            Field::AutomaticAllocation(true),
            Field::Connection(connection.clone()),
            Field::Description(format!(
                "{adapter_type} ethernet adapter on \"{connection}\""
            )),
            Field::ResourceSubType(adapter_type.to_string()),
        ]);
        self.last().vendor_config.push((
            "wakeOnLanEnabled".to_string(),
            bool_str(wake_on_lan).to_string(),
        ));
        id
    }

    /// Vendor-extension entry on the whole hardware section.
    pub fn add_vendor_config(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.section_config.push((key.into(), value.into()));
    }

    /// Vendor-extension entry on a specific item. Returns false when no item
    /// with that instance id exists.
    pub fn add_item_vendor_config(
        &mut self,
        item: InstanceId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> bool {
        match self.items.iter_mut().find(|i| i.instance_id == item) {
            Some(found) => {
                found.vendor_config.push((key.into(), value.into()));
                true
            }
            None => false,
        }
    }

    /// Hardware section with each item's children reordered lexicographically
    /// by qualified name, as the import API requires.
    pub(super) fn hardware_section(&self) -> Element {
        let mut section = Element::new(QName::plain("VirtualHardwareSection"));
        section.push(Element::new(QName::plain("Info")).text("Virtual hardware requirements"));
        for item in &self.items {
            let mut element = item.to_element();
            element.sort_children();
            section.push(element);
        }
        for (key, value) in &self.section_config {
            section.push(vendor_config(key, value));
        }
        section
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn system() -> VirtualSystem {
        VirtualSystem::new("test")
    }

    #[test]
    fn test_instance_ids_assigned_in_call_order() {
        let mut vs = system();
        let a = vs.add_system("test", "vmx-11");
        let b = vs.add_vcpus(2);
        let c = vs.add_memory(1024);
        let d = vs.add_scsi_controller(0);
        assert_eq!((a, b, c, d), (InstanceId(0), InstanceId(1), InstanceId(2), InstanceId(3)));
    }

    #[test]
    fn test_category_counters_independent_of_instance_ids() {
        let mut vs = system();
        let scsi = vs.add_scsi_controller(0);
        let ide = vs.add_ide_controller(0);

        vs.add_cd_rom(ide, 0);
        vs.add_hard_disk(scsi, 0, "ovf:/disk/vmdisk1", false, None);
        vs.add_floppy_drive(0);
        vs.add_ethernet("lan", "VmxNet3", true);
        vs.add_cd_rom(ide, 1);
        vs.add_hard_disk(scsi, 1, "ovf:/disk/vmdisk2", false, None);

        let names: Vec<&str> = vs.items.iter().map(|i| i.element_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "SCSI Controller 0",
                "VirtualIDEController 0",
                "CD-ROM 1",
                "Hard Disk 1",
                "Floppy 1",
                "Ethernet 1",
                "CD-ROM 2",
                "Hard Disk 2",
            ]
        );
    }

    #[test]
    fn test_nic_addresses_start_at_seven_and_increment() {
        let mut vs = system();
        for net in ["a", "b", "c"] {
            vs.add_ethernet(net, "VmxNet3", true);
        }
        let addresses: Vec<u32> = vs
            .items
            .iter()
            .filter_map(|i| {
                i.fields.iter().find_map(|f| match f {
                    Field::AddressOnParent(v) => Some(*v),
                    _ => None,
                })
            })
            .collect();
        assert_eq!(addresses, vec![7, 8, 9]);
    }

    #[test]
    fn test_disk_mode_emitted_only_when_supplied() {
        let mut vs = system();
        let scsi = vs.add_scsi_controller(0);
        vs.add_hard_disk(scsi, 0, "ovf:/disk/vmdisk1", false, None);
        vs.add_hard_disk(scsi, 1, "ovf:/disk/vmdisk2", true, Some("persistent"));

        let configs: Vec<_> = vs.items[1].vendor_config.clone();
        assert_eq!(configs, vec![("backing.writeThrough".to_string(), "false".to_string())]);

        let configs: Vec<_> = vs.items[2].vendor_config.clone();
        assert_eq!(
            configs,
            vec![
                ("backing.writeThrough".to_string(), "true".to_string()),
                ("backing.diskMode".to_string(), "persistent".to_string()),
            ]
        );
    }

    #[test]
    fn test_hard_disk_references_controller_id() {
        let mut vs = system();
        let scsi = vs.add_scsi_controller(0);
        vs.add_hard_disk(scsi, 0, "ovf:/disk/vmdisk1", false, None);
        let parent = vs.items[1].fields.iter().find_map(|f| match f {
            Field::Parent(id) => Some(*id),
            _ => None,
        });
        assert_eq!(parent, Some(scsi));
    }

    proptest! {
        #[test]
        fn test_ids_sequential_for_any_construction_order(choices in prop::collection::vec(0u8..6, 1..32)) {
            let mut vs = system();
            let mut ids = Vec::new();
            let anchor = vs.add_scsi_controller(0);
            ids.push(anchor);
            for choice in choices {
                ids.push(match choice {
                    0 => vs.add_vcpus(1),
                    1 => vs.add_memory(512),
                    2 => vs.add_cd_rom(anchor, 0),
                    3 => vs.add_hard_disk(anchor, 0, "ovf:/disk/vmdisk1", false, None),
                    4 => vs.add_ethernet("lan", "VmxNet3", false),
                    _ => vs.add_floppy_drive(0),
                });
            }
            for (expected, id) in ids.iter().enumerate() {
                prop_assert_eq!(id.0, expected as u32);
            }
        }
    }

    #[test]
    fn test_item_vendor_config_targets_specific_item() {
        let mut vs = system();
        let scsi = vs.add_scsi_controller(0);
        assert!(vs.add_item_vendor_config(scsi, "slotInfo.pciSlotNumber", "16"));
        assert!(!vs.add_item_vendor_config(InstanceId(99), "k", "v"));
        assert_eq!(
            vs.items[0].vendor_config,
            vec![("slotInfo.pciSlotNumber".to_string(), "16".to_string())]
        );
    }
}
