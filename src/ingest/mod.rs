/// Feed clients and snapshot parsing.
///
/// Each upstream source gets its own file under ingest/. Buienradar is the
/// only one today.
pub mod buienradar;

#[cfg(test)]
pub(crate) mod fixtures;
