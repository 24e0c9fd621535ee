use super::model::HttpRecord;
use crate::codec::Encoding;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, Table};

/// 以表格形式渲染一条记录
pub fn render_record(record: &HttpRecord, encoding: Encoding) -> String {
    let request = &record.request;
    let response = &record.response;

    let status_color = if response.status < 400 {
        Color::Green
    } else {
        Color::Red
    };

    let mut summary = Table::new();
    summary.load_preset(UTF8_FULL).set_header(vec!["Field", "Value"]);
    summary.add_row(vec![
        Cell::new("Identifier"),
        Cell::new(record.identifier.as_str()).add_attribute(Attribute::Dim),
    ]);
    summary.add_row(vec![Cell::new("Method"), Cell::new(&request.method)]);
    summary.add_row(vec![Cell::new("URL"), Cell::new(&request.url)]);
    summary.add_row(vec![
        Cell::new("Status"),
        Cell::new(response.status).fg(status_color),
    ]);
    summary.add_row(vec![
        Cell::new("Request body"),
        Cell::new(format!("{} bytes", request.body.len())),
    ]);
    summary.add_row(vec![
        Cell::new("Response body"),
        Cell::new(format!("{} bytes", response.body.len())),
    ]);

    let mut output = vec![summary.to_string()];
    output.push(headers_table("Request header", &request.headers));
    output.push(headers_table("Response header", &response.headers));

    if !response.body.is_empty() {
        output.push(encoding.decode(&response.body));
    }

    output.join("\n")
}

pub fn print_record(record: &HttpRecord, encoding: Encoding) {
    println!("{}", render_record(record, encoding));
}

fn headers_table(title: &str, headers: &[(String, String)]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![title, "Value"]);
    for (name, value) in headers {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    table.to_string()
}
