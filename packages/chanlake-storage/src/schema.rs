#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaPart {
	RawMessages,
	Detections,
}

pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

pub fn render_part(part: SchemaPart) -> String {
	let table = match part {
		SchemaPart::RawMessages => "\\ir tables/001_telegram_messages.sql",
		SchemaPart::Detections => "\\ir tables/002_image_detections.sql",
	};

	expand_includes(&format!("\\ir 00_schemas.sql\n{table}\n"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_schemas.sql" => out.push_str(include_str!("../../../sql/00_schemas.sql")),
				"tables/001_telegram_messages.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_telegram_messages.sql")),
				"tables/002_image_detections.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_image_detections.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
