use serde::Serializer;
use time::Date;

pub fn serialize<S>(value: &Date, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.serialize_str(&chanlake_domain::ingest::date_segment(*value))
}
