#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use sheetform::assembler::{Assembler, Assembly};
use sheetform::cache::RawDataCache;
use sheetform::config::Config;
use sheetform::renderer::MiniJinjaRenderer;
use sheetform::resolver::Resolver;
use sheetform::rules::RuleSet;
use sheetform::workbook::Workbook;
use zip::write::SimpleFileOptions;

pub type Rows = Vec<Vec<&'static str>>;

pub fn build_env_rows() -> Rows {
    vec![
        vec!["Setting", "Notes", "Value"],
        vec!["Location", "Azure region", "East US 2"],
        vec!["Subscription", "Target subscription", "sub-platform-dev"],
        vec!["Service Principal", "Deployment identity", "spn-payments-dev"],
        vec!["Admin User", "Local administrator", "opsadmin"],
        vec!["Key Vault SKU", "", "premium"],
        vec!["Soft delete retention", "Days", "30 days"],
        vec!["Public network access", "1 = enabled", "0"],
        vec!["Subnet prefix", "", "10.20.1.0/24"],
    ]
}

pub fn resources_rows() -> Rows {
    vec![
        vec!["Project Name", "Payments Platform"],
        vec!["Abbreviated App Name", "payapi"],
        vec!["Environment", "DEV"],
        vec!["Application Owner", "Jane Roe"],
        vec!["Business Owner", "Finance Ops"],
        vec!["Service Now Ticket", "RITM0012345"],
        vec!["Application Tier", "Silver"],
        vec![],
        vec!["Hostname", "VM Size", "OS Image", "OS Disk Size", "OS Disk Type", "Data Disks", "Zone", "Role"],
        vec!["pay web 01", "Standard_D2s_v3", "Windows Server 2022", "128 GB", "Premium_LRS", "64, 128", "1", "Web"],
        vec!["pay_db_01", "Standard_E4s_v5", "Ubuntu 22.04", "256", "Premium_ZRS", "512", "", "Database"],
        vec!["Pay Web 01", "Standard_D2s_v3", "Windows Server 2022", "128", "Standard_LRS", "", "", "Web"],
    ]
}

pub fn nsg_rows() -> Rows {
    vec![
        vec!["Priority", "Rule Name", "Direction", "Access", "Protocol", "Source Port", "Destination Port", "Description"],
        vec!["100", "Allow HTTPS", "Inbound", "Allow", "Tcp", "*", "443", "Web traffic"],
        vec!["110", "Allow SQL", "Inbound", "Allow", "Tcp", "*", "1433, 1434", "Database traffic"],
    ]
}

pub fn sample_sheets() -> Vec<(&'static str, Rows)> {
    vec![
        ("Build_ENV", build_env_rows()),
        ("Resources", resources_rows()),
        ("NSG", nsg_rows()),
    ]
}

pub fn sample_workbook() -> Workbook {
    Workbook::from_rows(sample_sheets())
}

pub fn default_config() -> Config {
    Config::from_overlay(None).unwrap()
}

pub fn assemble(workbook: Workbook) -> Assembly {
    assemble_with(&default_config(), workbook)
}

pub fn assemble_with(config: &Config, workbook: Workbook) -> Assembly {
    let rules = RuleSet::compile(config).unwrap();
    let cache = RawDataCache::build(workbook, &rules.cache_options());
    let resolver = Resolver::new(&cache, &rules.denylist);
    let engine = MiniJinjaRenderer::new();
    Assembler::new(&resolver, &rules, &engine).assemble().unwrap()
}

fn column_name(mut col: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).unwrap()
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

fn sheet_xml(rows: &[Vec<&str>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let reference = format!("{}{}", column_name(c), r + 1);
            if cell.parse::<f64>().is_ok() {
                xml.push_str(&format!(r#"<c r="{reference}"><v>{cell}</v></c>"#));
            } else {
                xml.push_str(&format!(
                    r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    escape_xml(cell)
                ));
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Writes a minimal but valid .xlsx file with inline-string cells.
pub fn write_xlsx(path: &Path, sheets: &[(&str, Rows)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();

    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut relationships = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );

    for (i, (name, rows)) in sheets.iter().enumerate() {
        let n = i + 1;
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            escape_xml(name)
        ));
        relationships.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));

        zip.start_file(format!("xl/worksheets/sheet{n}.xml"), options).unwrap();
        zip.write_all(sheet_xml(rows).as_bytes()).unwrap();
    }

    content_types.push_str("</Types>");
    workbook.push_str("</sheets></workbook>");
    relationships.push_str("</Relationships>");

    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(content_types.as_bytes()).unwrap();
    zip.start_file("_rels/.rels", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
    )
    .unwrap();
    zip.start_file("xl/workbook.xml", options).unwrap();
    zip.write_all(workbook.as_bytes()).unwrap();
    zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
    zip.write_all(relationships.as_bytes()).unwrap();
    zip.finish().unwrap();
}
