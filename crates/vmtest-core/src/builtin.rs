//! Built-in release and scenario definitions.

use crate::collect::CommandBlock;
use crate::compat::CompatTable;
use crate::error::Result;
use crate::registry::{Catalog, CatalogBuilder};
use crate::release::{Distro, ReleaseTrait};
use crate::scenario::ScenarioTrait;
use crate::topology::DiskOverrides;
use crate::verify::Assertion;

const SERIAL_CONSOLE: &str = "console=ttyS0";
const DEFAULT_DRIVER: &str = "virtio-blk";
const CENTOS_BOOTIF: &str = "BOOTIF=eth0-52:54:00:12:34:00";

/// Builds the catalog of supported releases and scenarios.
///
/// # Errors
///
/// Fails only if the definitions below contain a duplicate or malformed id.
pub fn catalog() -> Result<Catalog> {
    let mut builder = CatalogBuilder::new();
    for release in releases()? {
        builder.release(release)?;
    }
    for scenario in scenarios()? {
        builder.scenario(scenario)?;
    }
    Ok(builder.build())
}

fn releases() -> Result<Vec<ReleaseTrait>> {
    let ubuntu = |id: &str, release: &str| -> Result<ReleaseTrait> {
        Ok(ReleaseTrait::ubuntu(id, release)?
            .kernel_args([SERIAL_CONSOLE])
            .disks(DiskOverrides::default().driver(DEFAULT_DRIVER)))
    };
    let centos = |id: &str, target: &str| -> Result<ReleaseTrait> {
        Ok(ReleaseTrait::centos(id, target, "xenial")?
            .kernel_args([SERIAL_CONSOLE])
            .disks(DiskOverrides::default().driver(DEFAULT_DRIVER))
            .description(format!("{target} installed from a xenial ephemeral image")))
    };

    Ok(vec![
        ubuntu("trusty", "trusty")?,
        ubuntu("trusty-hwe-u", "trusty")?.kernel_release("utopic"),
        ubuntu("trusty-hwe-v", "trusty")?.kernel_release("vivid"),
        ubuntu("trusty-hwe-w", "trusty")?.kernel_release("wily"),
        ubuntu("xenial", "xenial")?,
        ubuntu("yakkety", "yakkety")?,
        ubuntu("bionic", "bionic")?,
        ubuntu("cosmic", "cosmic")?,
        ubuntu("disco", "disco")?,
        centos("centos66-xenial", "centos66")?,
        centos("centos70-xenial", "centos70")?,
    ])
}

fn network_base() -> Result<ScenarioTrait> {
    Ok(ScenarioTrait::new("network-base", "examples/tests/basic_network.yaml")?
        .description("network configuration rendered by the installer")
        .collect_text(
            r"
            cd OUTPUT_COLLECT_D
            echo 'waiting for ipv6 to settle' && sleep 5
            ifconfig -a > ifconfig_a
            ip link show > ip_link_show
            ip a > ip_a
            find /etc/network/interfaces.d > find_interfacesd
            cp -av /etc/network/interfaces .
            cp -av /etc/network/interfaces.d .
            cp /etc/resolv.conf .
            cp -av /etc/udev/rules.d/70-persistent-net.rules .
            ip -o route show > ip_route_show
            ip -6 -o route show > ip_6_route_show
            route -n > route_n
            route -6 -n > route_6_n
            cp -av /run/network ./run_network
            ",
        )
        .assertion(Assertion::files_exist(
            "output_files_exist",
            ["ip_a", "ip_route_show", "route_n"],
        )))
}

fn scenarios() -> Result<Vec<ScenarioTrait>> {
    let network_basic = network_base()?
        .derive("network-basic")?
        .distros([Distro::Ubuntu])
        .assertion(Assertion::contains_pattern(
            "etc_network_interfaces",
            "interfaces",
            r"^\s*iface\s+\S+\s+inet",
        )?)
        .assertion(Assertion::contains_pattern(
            "etc_resolvconf",
            "resolv.conf",
            r"^nameserver\s+\S+",
        )?);

    let static_route = || Assertion::contains_pattern("static_routes_applied", "ip_route_show", r"\svia\s");

    let network_static_routes = network_basic
        .derive("network-static-routes")?
        .description("static network routes with ipv4")
        .conf_file("examples/tests/network_static_routes.yaml")
        .assertion(static_route()?);

    let centos_basic = ScenarioTrait::new("centos-basic", "examples/tests/centos_basic.yaml")?
        .description("basic CentOS install")
        .distros([Distro::Centos])
        .kernel_args([CENTOS_BOOTIF])
        .collect_text(
            r#"
            cd OUTPUT_COLLECT_D
            cat /etc/fstab > fstab
            rpm -qa | cat >rpm_qa
            ifconfig -a | cat >ifconfig_a
            ip a | cat >ip_a
            netstat -rn | cat >netstat_rn
            echo $PIPESTATUS | cat >netstat_pipestatus
            cp -a /etc/sysconfig/network-scripts .
            cp -a /var/log/messages .
            cp -a /var/log/cloud-init* .
            cp -a /var/lib/cloud ./var_lib_cloud
            cp -a /run/cloud-init ./run_cloud-init
            python2 -c 'from cloudinit import util; \
                        print(util.subp(["netstat", "-rn"]))'
            "#,
        )
        .assertion(Assertion::files_exist("output_files_exist", ["fstab"]))
        .assertion(Assertion::fstab_mapping(
            "fstab_entries",
            "fstab",
            [("LABEL=cloudimg-rootfs", "/")],
        ));

    let centos_block = CommandBlock::from_text(
        "
        cd OUTPUT_COLLECT_D
        cp -a /etc/sysconfig/network-scripts .
        cp -a /var/log/cloud-init* .
        cp -a /var/lib/cloud ./var_lib_cloud
        cp -a /run/cloud-init ./run_cloud-init
        ",
    );
    let centos_basic_network = network_base()?
        .derive("centos-basic-network")?
        .distros([Distro::Centos])
        .conf_file("examples/tests/centos_basic.yaml")
        .kernel_args([CENTOS_BOOTIF])
        .collect_block(centos_block)
        .assertion(Assertion::files_exist("network_scripts", ["network-scripts"]));

    let centos_network_static_routes = centos_basic_network
        .derive("centos-network-static-routes")?
        .description("static network routes with ipv4 on CentOS")
        .conf_file("examples/tests/network_static_routes.yaml")
        .assertion(static_route()?);

    let multipath_basic = ScenarioTrait::new("multipath-basic", "examples/tests/multipath.yaml")?
        .description("root disk attached through two scsi paths")
        .distros([Distro::Ubuntu])
        .disks(
            DiskOverrides::default()
                .driver("scsi-hd")
                .multipath(true)
                .extra_disks(Vec::<String>::new())
                .nvme_disks(Vec::<String>::new()),
        )
        .collect_text(
            "
            cd OUTPUT_COLLECT_D
            blkid -o export /dev/sda > blkid_output_sda
            blkid -o export /dev/sda1 > blkid_output_sda1
            blkid -o export /dev/sda2 > blkid_output_sda2
            blkid -o export /dev/sdb > blkid_output_sdb
            blkid -o export /dev/sdb1 > blkid_output_sdb1
            blkid -o export /dev/sdb2 > blkid_output_sdb2
            dmsetup ls > dmsetup_ls
            dmsetup info > dmsetup_info
            cat /proc/partitions > proc_partitions
            multipath -ll > multipath_ll
            multipath -v3 -ll > multipath_v3_ll
            multipath -r > multipath_r
            cp -a /etc/multipath* .
            ls -al /dev/disk/by-uuid/ > ls_uuid
            ls -al /dev/disk/by-id/ > ls_disk_id
            readlink -f /sys/class/block/sda/holders/dm-0 > holders_sda
            readlink -f /sys/class/block/sdb/holders/dm-0 > holders_sdb
            cat /etc/fstab > fstab
            mkdir -p /dev/disk/by-dname
            ls /dev/disk/by-dname/ > ls_dname
            find /etc/network/interfaces.d > find_interfacesd
            ",
        )
        .assertion(Assertion::files_exist("output_files_exist", ["fstab", "ls_dname"]))
        .assertion(Assertion::lacks_pattern(
            "interfacesd_eth0_removed",
            "find_interfacesd",
            r"eth0\.cfg$",
        )?)
        .assertion(Assertion::files_equal(
            "multipath_disks_match",
            "holders_sda",
            "holders_sdb",
        ));

    Ok(vec![
        network_basic,
        network_static_routes,
        centos_basic,
        centos_basic_network,
        centos_network_static_routes,
        multipath_basic,
    ])
}

/// Enablement rules for the built-in catalog.
///
/// # Errors
///
/// Fails only if a rule below contains a malformed id.
pub fn compat_table() -> Result<CompatTable> {
    const HWE: [&str; 3] = ["trusty-hwe-u", "trusty-hwe-v", "trusty-hwe-w"];

    let mut table = CompatTable::new().disable(
        "centos66-xenial",
        "centos-basic",
        Some(
            "grub config in the target names the drive with hd(1,0) syntax, \
             which breaks once the installation medium is removed",
        ),
    )?;

    for release in HWE {
        table = table.disable(
            release,
            "network-static-routes",
            Some("off by default to save suite runtime; covered by trusty/network-static-routes"),
        )?;
    }
    table = table.incompatible("yakkety", "network-static-routes")?;

    for release in HWE.into_iter().chain(["bionic", "cosmic", "disco"]) {
        table = table.incompatible(release, "multipath-basic")?;
    }

    table = table
        .incompatible("centos66-xenial", "centos-basic-network")?
        .disable("centos66-xenial", "centos-network-static-routes", None)?
        .disable("centos70-xenial", "centos-network-static-routes", None)?;

    Ok(table)
}
