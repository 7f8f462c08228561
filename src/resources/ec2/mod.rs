//! EC2 networking and compute.

pub mod flow_log;
pub mod instance;
pub mod machine_image;
pub mod security_group;
pub mod user_data;
pub mod vpc;

pub use flow_log::{FlowLog, FlowLogDestination, FlowLogOptions, FlowLogTrafficType};
pub use instance::{
    BlockDevice, BlockDeviceVolume, EbsDeviceOptions, Instance, InstanceClass, InstanceProps,
    InstanceSize, InstanceType,
};
pub use machine_image::GenericLinuxImage;
pub use security_group::{Peer, Port, Protocol, SecurityGroup, SecurityGroupProps};
pub use user_data::UserData;
pub use vpc::{Subnet, SubnetConfiguration, SubnetType, Vpc, VpcProps};
