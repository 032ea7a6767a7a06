//! Import-descriptor construction.
//!
//! ## Architecture
//!
//! - `xml`: typed namespaced document model and deterministic serializer
//! - `hardware`: per-category hardware item builder with instance-id and
//!   display-number bookkeeping
//! - `envelope`: assembles file references, disks, networks, and virtual
//!   systems into the final document

mod envelope;
mod hardware;
mod xml;

pub use envelope::Envelope;
pub use hardware::{HardwareItem, InstanceId, ResourceKind, VirtualSystem};
pub use xml::{Element, QName, Xmlns};

use crate::options::MachineOptions;

/// Disk format URI the platform expects for streamed uploads.
const STREAM_OPTIMIZED_FORMAT: &str =
    "http://www.vmware.com/interfaces/specifications/vmdk.html#streamOptimized";

/// Build the canned single-machine descriptor submitted in phase 2.
///
/// One virtual system sized from the configured vCPU count, memory, and disk
/// capacity; one stream-optimized disk backed by `disk-1.vmdk`; one Ethernet
/// adapter per configured network.
pub fn import_descriptor(options: &MachineOptions) -> String {
    let mut envelope = Envelope::new();

    envelope.add_file_reference("disk-1.vmdk", "file1", 0);
    envelope.add_disk(
        options.disk_mb,
        "byte * 2^20",
        "vmdisk1",
        "file1",
        STREAM_OPTIMIZED_FORMAT,
    );
    for network in &options.networks {
        envelope.add_network(network);
    }

    let system = envelope.add_virtual_system(&options.name);
    system.add_operating_system(100, &options.guest_os_type);
    system.add_system(&options.name, &options.hardware_version);
    system.add_vcpus(options.vcpus);
    system.add_memory(options.memory_mb);
    let scsi = system.add_scsi_controller(0);
    system.add_video_card(false, false, "automatic", false, 4096);
    system.add_vmci_device(false);
    system.add_hard_disk(scsi, 0, "ovf:/disk/vmdisk1", false, None);
    for network in &options.networks {
        system.add_ethernet(network, "VmxNet3", true);
    }

    envelope.serialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> MachineOptions {
        let mut opts = MachineOptions::named("node-0");
        opts.vcpus = 2;
        opts.memory_mb = 1024;
        opts.disk_mb = 10240;
        opts.networks = vec!["lan".to_string()];
        opts
    }

    #[test]
    fn test_profile_matches_configuration() {
        let xml = import_descriptor(&options());
        assert!(xml.contains("<rasd:ElementName>2 virtual CPU(s)</rasd:ElementName>"));
        assert!(xml.contains("<rasd:ElementName>1024MB of memory</rasd:ElementName>"));
        assert!(xml.contains("ovf:capacity=\"10240\""));
        assert!(xml.contains("<Network ovf:name=\"lan\">"));
        assert!(xml.contains("<rasd:ResourceSubType>VmxNet3</rasd:ResourceSubType>"));
    }

    #[test]
    fn test_single_network_yields_single_adapter_at_offset() {
        let xml = import_descriptor(&options());
        assert_eq!(xml.matches("<rasd:Connection>").count(), 1);
        assert!(xml.contains("<rasd:AddressOnParent>7</rasd:AddressOnParent>"));
    }

    #[test]
    fn test_disk_parented_to_scsi_controller() {
        let xml = import_descriptor(&options());
        // Call order: system=0, vcpus=1, memory=2, scsi=3, video=4, vmci=5,
        // disk=6. The disk references the controller id.
        assert!(xml.contains("<rasd:Parent>3</rasd:Parent>"));
        assert!(xml.contains("<rasd:AddressOnParent>0</rasd:AddressOnParent>"));
        assert!(xml.contains("<rasd:HostResource>ovf:/disk/vmdisk1</rasd:HostResource>"));
    }

    #[test]
    fn test_descriptor_is_pure_function_of_options() {
        assert_eq!(import_descriptor(&options()), import_descriptor(&options()));
    }
}
