pub(crate) mod fix;
pub(crate) mod report;
pub(crate) mod scan;
