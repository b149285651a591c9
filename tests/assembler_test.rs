mod common;

use common::{assemble, assemble_with, build_env_rows, default_config, nsg_rows, resources_rows, Rows};
use sheetform::assembler::placeholder;
use sheetform::config::{merge_values, parse_config, Config};
use sheetform::diagnostics::DiagnosticKind;
use sheetform::entity::OsType;
use sheetform::resolver::Confidence;
use sheetform::workbook::Workbook;

fn workbook(build_env: Rows, resources: Rows, nsg: Rows) -> Workbook {
    Workbook::from_rows(vec![("Build_ENV", build_env), ("Resources", resources), ("NSG", nsg)])
}

fn vm_sheet(rows: Vec<Vec<&'static str>>) -> Rows {
    let mut sheet = vec![vec!["Hostname", "VM Size", "OS Image", "Role"]];
    sheet.extend(rows);
    sheet
}

/// The project block of the sample Resources sheet followed by a VM table.
fn resources_with_vms(rows: Vec<Vec<&'static str>>) -> Rows {
    let mut sheet: Rows = resources_rows().into_iter().take(8).collect();
    sheet.extend(vm_sheet(rows));
    sheet
}

#[test]
fn test_project_fields_resolved_from_row_label_tables() {
    let assembly = assemble(common::sample_workbook());
    let project = &assembly.project;

    assert_eq!(project.project_name, "Payments Platform");
    assert_eq!(project.application_name, "payapi");
    assert_eq!(project.environment, "DEV");
    assert_eq!(project.location, "East US 2");
    assert_eq!(project.subscription, "sub-platform-dev");
    assert_eq!(project.spn, "spn-payments-dev");
    assert_eq!(project.app_owner, "Jane Roe");
    assert_eq!(project.service_now_ticket, "RITM0012345");
    assert_eq!(project.app_tier, "Silver");
    assert_eq!(project.admin_username, "opsadmin");
    assert_eq!(project.key_vault_sku, "premium");
    assert_eq!(project.soft_delete_retention_days, 30);
    assert!(!project.public_network_access);
    assert_eq!(project.subnet_prefix, "10.20.1.0/24");
}

#[test]
fn test_label_value_pair_beats_table_on_other_sheet() {
    let mut resources: Rows = vec![vec!["Location", "here"], vec!["Region Owner", "ops"], vec![]];
    resources.extend(resources_rows());

    let assembly = assemble(workbook(build_env_rows(), resources, nsg_rows()));

    assert_eq!(assembly.project.location, "here");
    let location = assembly.fields["project"].get("location").unwrap();
    assert_eq!(location.confidence, Confidence::Exact);
    let source = location.source.as_ref().unwrap();
    assert_eq!((source.sheet.as_str(), source.row, source.column), ("Resources", 0, 1));
    assert_eq!(assembly.project.project_name, "Payments Platform");
    assert_eq!(assembly.virtual_machines.len(), 3);
}

#[test]
fn test_virtual_machines_built_per_row() {
    let assembly = assemble(common::sample_workbook());
    let vms = &assembly.virtual_machines;

    assert_eq!(vms.len(), 3);
    assert_eq!(assembly.fields.keys().filter(|k| k.starts_with("virtual_machines[")).count(), 3);
    assert_eq!(vms[0].name, "pay-web-01");
    assert_eq!(vms[0].size, "Standard_D2s_v3");
    assert_eq!(vms[0].os_type, OsType::Windows);
    assert_eq!(vms[0].os_disk_size_gb, 128);
    assert_eq!(vms[0].data_disk_sizes_gb, vec![64, 128]);
    assert_eq!(vms[0].zone, "1");
    assert_eq!(vms[0].ip_allocation, "Dynamic");
    assert_eq!(vms[0].snow_item, "RITM0012345");

    assert_eq!(vms[1].name, "pay-db-01");
    assert_eq!(vms[1].os_type, OsType::Linux);
    assert_eq!(vms[1].os_disk_type, "Premium_ZRS");
    assert_eq!(vms[1].zone, "");
}

#[test]
fn test_security_rules_built_per_row() {
    let assembly = assemble(common::sample_workbook());
    let rules = &assembly.security_rules;

    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0].name, "allow-https");
    assert_eq!(rules[0].priority, 100);
    assert_eq!(rules[0].destination_ports, vec!["443"]);
    assert_eq!(rules[1].destination_ports, vec!["1433", "1434"]);
    assert_eq!(rules[1].description, "Database traffic");
    assert_eq!(rules[1].source_name, "Source");
}

#[test]
fn test_entity_count_follows_populated_rows() {
    let mut rows: Vec<Vec<&'static str>> = (0..23)
        .map(|_| vec!["app server", "Standard_D2s_v3", "Windows Server 2022", "App"])
        .collect();
    rows.push(vec!["", "", "", ""]);
    rows.push(vec!["", "", "", ""]);

    let assembly = assemble(workbook(build_env_rows(), vm_sheet(rows), nsg_rows()));

    assert_eq!(assembly.virtual_machines.len(), 23);
    assert_eq!(assembly.summary.virtual_machines, 23);
}

#[test]
fn test_sparse_rows_are_not_entities() {
    let rows = vec![
        vec!["web01", "Standard_D2s_v3", "Windows Server 2022", "Web"],
        vec!["", "", "", "see note"],
        vec!["web02", "Standard_D2s_v3", "", ""],
    ];

    let assembly = assemble(workbook(build_env_rows(), vm_sheet(rows), nsg_rows()));

    let names: Vec<_> = assembly.virtual_machines.iter().map(|vm| vm.name.as_str()).collect();
    assert_eq!(names, vec!["web01", "web02"]);
}

#[test]
fn test_duplicate_names_get_suffixes() {
    let rows = vec![
        vec!["app", "Standard_D2s_v3", "Windows Server 2022", "Web"],
        vec!["APP ", "Standard_D2s_v3", "Windows Server 2022", "Web"],
        vec!["app", "Standard_D2s_v3", "Windows Server 2022", "Web"],
        vec!["app-2", "Standard_D2s_v3", "Windows Server 2022", "Web"],
    ];

    let assembly = assemble(workbook(build_env_rows(), vm_sheet(rows), nsg_rows()));

    let names: Vec<_> = assembly.virtual_machines.iter().map(|vm| vm.name.as_str()).collect();
    assert_eq!(names, vec!["app", "app-2", "app-3", "app-2-2"]);
    assert_eq!(assembly.summary.collisions(), 3);
}

#[test]
fn test_uniqueness_is_reproducible() {
    let rows = || {
        vec![
            vec!["node", "Standard_D2s_v3", "Ubuntu", "Worker"],
            vec!["node", "Standard_D2s_v3", "Ubuntu", "Worker"],
        ]
    };
    let first = assemble(workbook(build_env_rows(), vm_sheet(rows()), nsg_rows()));
    let second = assemble(workbook(build_env_rows(), vm_sheet(rows()), nsg_rows()));

    assert_eq!(first.virtual_machines, second.virtual_machines);
}

#[test]
fn test_required_field_defaulted_once() {
    let resources: Rows = resources_rows()
        .into_iter()
        .filter(|row| row.first() != Some(&"Application Owner"))
        .collect();

    let assembly = assemble(workbook(build_env_rows(), resources, nsg_rows()));

    assert_eq!(assembly.project.app_owner, "TBD");
    let recorded: Vec<_> = assembly.summary.for_field("project", "app_owner").collect();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].kind, DiagnosticKind::Defaulted { value: "TBD".into() });
}

#[test]
fn test_templated_defaults_see_resolved_fields() {
    let build_env: Rows = build_env_rows()
        .into_iter()
        .filter(|row| row.first() != Some(&"Service Principal"))
        .collect();
    let rows = vec![
        vec!["", "Standard_D2s_v3", "Windows Server 2022", "Web"],
        vec!["", "Standard_D2s_v3", "Windows Server 2022", "Web"],
    ];

    let assembly = assemble(workbook(build_env, resources_with_vms(rows), nsg_rows()));

    assert_eq!(assembly.project.spn, "spn-terraform-payments-platform");
    let names: Vec<_> = assembly.virtual_machines.iter().map(|vm| vm.name.as_str()).collect();
    assert_eq!(names, vec!["payapi-1", "payapi-2"]);
}

#[test]
fn test_rule_defaults_use_row_index() {
    let nsg = vec![
        vec!["Priority", "Protocol", "Destination Port"],
        vec!["", "Udp", "53"],
        vec!["", "Tcp", "22"],
    ];

    let assembly = assemble(workbook(build_env_rows(), resources_rows(), nsg));

    let rules = &assembly.security_rules;
    assert_eq!(rules.len(), 2);
    assert_eq!((rules[0].name.as_str(), rules[0].priority), ("rule-1", 100));
    assert_eq!((rules[1].name.as_str(), rules[1].priority), ("rule-2", 110));
    assert_eq!(rules[1].description, "Security rule for Payments Platform");
}

#[test]
fn test_required_field_without_default_gets_placeholder() {
    let mut value = serde_json::to_value(default_config()).unwrap();
    merge_values(
        &mut value,
        parse_config("project: {app_owner: {default: null, keywords: [nobody], key_value: false}}").unwrap(),
    );
    let config: Config = serde_json::from_value(value).unwrap();

    let assembly = assemble_with(&config, common::sample_workbook());

    assert_eq!(assembly.project.app_owner, placeholder("app_owner"));
    assert_eq!(assembly.project.app_owner, "UNRESOLVED_APP_OWNER");
    assert_eq!(assembly.summary.placeholders(), 1);
}

#[test]
fn test_unparsable_number_falls_back() {
    let rows = vec![vec!["web01", "Standard_D2s_v3", "Windows Server 2022", "Web", "large"]];
    let mut sheet = vec![vec!["Hostname", "VM Size", "OS Image", "Role", "OS Disk Size"]];
    sheet.extend(rows);

    let assembly = assemble(workbook(build_env_rows(), sheet, nsg_rows()));

    assert_eq!(assembly.virtual_machines[0].os_disk_size_gb, 128);
    let kinds: Vec<_> = assembly.summary.for_field("virtual_machines[1]", "os_disk_size").map(|d| &d.kind).collect();
    assert!(matches!(kinds.as_slice(), [DiagnosticKind::Unparsable { .. }]));
}

#[test]
fn test_missing_entity_table_yields_no_entities() {
    let assembly = assemble(workbook(build_env_rows(), resources_rows(), vec![vec!["Nothing here"]]));
    assert!(assembly.security_rules.is_empty());
    assert_eq!(assembly.virtual_machines.len(), 3);
}

#[test]
fn test_summary_counts_fields() {
    let assembly = assemble(common::sample_workbook());
    let summary = &assembly.summary;

    assert!(summary.resolved_fields > 0);
    assert!(summary.defaulted_fields > 0);
    assert_eq!(summary.render_failures(), 0);
    let text = summary.to_string();
    assert!(text.contains("3 virtual machines"));
    assert!(text.contains("2 security rules"));
}
