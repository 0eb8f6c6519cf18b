//! Alibaba Cloud DNS response bodies

use serde::Deserialize;

/// Error body returned with any non-success status
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct DescribeSubDomainRecordsResponse {
    #[serde(rename = "TotalCount", default)]
    pub total_count: u32,
    #[serde(rename = "DomainRecords", default)]
    pub domain_records: DomainRecords,
}

#[derive(Debug, Default, Deserialize)]
pub struct DomainRecords {
    #[serde(rename = "Record", default)]
    pub record: Vec<DomainRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomainRecord {
    #[serde(rename = "RecordId")]
    pub record_id: String,
    #[serde(rename = "RR")]
    pub rr: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "TTL")]
    pub ttl: Option<u32>,
    #[serde(rename = "DomainName", default)]
    pub domain_name: String,
}

/// Body of AddDomainRecord and UpdateDomainRecord
#[derive(Debug, Deserialize)]
pub struct RecordIdResponse {
    #[serde(rename = "RecordId")]
    pub record_id: String,
}
