//! `/api/complexes/*` and `/excel/complexes/*` endpoints.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::client::{segment, CrmClient};
use super::ComplexApi;
use crate::types::{ApartmentInfo, Complex, CrmError, CrmResult, UnitStatus};

/// One row of the admin chess grid: column header → cell value.
pub type GridRecord = serde_json::Map<String, serde_json::Value>;

/// Query for `/api/complexes/apartment-info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApartmentQuery {
    #[serde(rename = "jkName")]
    pub complex_name: String,
    #[serde(rename = "blockName")]
    pub block_name: String,
    #[serde(rename = "apartmentSize")]
    pub apartment_size: String,
    pub floor: String,
    #[serde(rename = "apartmentNumber")]
    pub apartment_number: String,
}

impl ApartmentQuery {
    fn to_query_string(&self) -> String {
        format!(
            "jkName={}&blockName={}&apartmentSize={}&floor={}&apartmentNumber={}",
            urlencoding::encode(&self.complex_name),
            urlencoding::encode(&self.block_name),
            urlencoding::encode(&self.apartment_size),
            urlencoding::encode(&self.floor),
            urlencoding::encode(&self.apartment_number),
        )
    }
}

/// A single unit status change inside a chess grid batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(rename = "jkName")]
    pub complex_name: String,
    #[serde(rename = "blockName")]
    pub block_name: String,
    pub floor: String,
    #[serde(rename = "apartmentNumber")]
    pub apartment_number: String,
    #[serde(rename = "newStatus")]
    pub new_status: UnitStatus,
}

/// Spreadsheet files attached to a complex, split by role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexFiles {
    /// `*jk_data.xlsx`: the chess grid source.
    pub data: Vec<String>,
    /// `*price_shaxamtka.xlsx`
    pub prices: Vec<String>,
    /// `*contract_template.docx`
    pub templates: Vec<String>,
    pub other: Vec<String>,
}

impl ComplexFiles {
    pub fn categorize(files: Vec<String>) -> Self {
        let mut out = ComplexFiles::default();
        for name in files {
            let lower = name.to_lowercase();
            if lower.ends_with("jk_data.xlsx") {
                out.data.push(name);
            } else if lower.ends_with("price_shaxamtka.xlsx") {
                out.prices.push(name);
            } else if lower.ends_with("contract_template.docx") {
                out.templates.push(name);
            } else {
                out.other.push(name);
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Wire envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ComplexList {
    #[serde(default)]
    complexes: Vec<Complex>,
}

#[derive(Debug, Deserialize)]
struct ComplexNames {
    #[serde(default)]
    complexes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Board {
    #[serde(default)]
    shaxmatka: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChessGrid {
    #[serde(default)]
    grid: Vec<GridRecord>,
}

#[derive(Debug, Serialize)]
struct ChessGridUpdate<'a> {
    updates: &'a [StatusUpdate],
}

/// `apartment-info` answers 200 with `{status: "error", message}` on misses.
#[derive(Debug, Deserialize)]
struct InfoEnvelope {
    status: String,
    #[serde(default)]
    data: Option<ApartmentInfo>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Client impl
// ---------------------------------------------------------------------------

#[async_trait]
impl ComplexApi for CrmClient {
    async fn list_complexes(&self) -> CrmResult<Vec<Complex>> {
        let list: ComplexList = self.get_json("/api/complexes/").await?;
        debug!(count = list.complexes.len(), "Complexes fetched");
        Ok(list.complexes)
    }

    async fn fetch_board(&self, complex: &str) -> CrmResult<Vec<Vec<serde_json::Value>>> {
        let board: Board = self
            .get_json(&format!("/api/complexes/jk/{}", segment(complex)))
            .await?;
        debug!(complex, rows = board.shaxmatka.len(), "Chess board fetched");
        Ok(board.shaxmatka)
    }

    async fn apartment_info(&self, query: &ApartmentQuery) -> CrmResult<ApartmentInfo> {
        let path = format!("/api/complexes/apartment-info?{}", query.to_query_string());
        let envelope: InfoEnvelope = self.get_json(&path).await?;

        if envelope.status != "success" {
            let message = envelope
                .message
                .or(envelope.detail)
                .unwrap_or_else(|| "unexpected server response".to_string());
            return Err(CrmError::Decode {
                endpoint: "/api/complexes/apartment-info".to_string(),
                message,
            });
        }

        envelope.data.ok_or_else(|| CrmError::Decode {
            endpoint: "/api/complexes/apartment-info".to_string(),
            message: "missing data".to_string(),
        })
    }

    async fn list_grid_complexes(&self) -> CrmResult<Vec<String>> {
        let names: ComplexNames = self.get_json("/excel/complexes").await?;
        Ok(names.complexes)
    }

    async fn list_complex_files(&self, complex: &str) -> CrmResult<Vec<String>> {
        let list: FileList = self
            .get_json(&format!("/excel/complexes/{}/files", segment(complex)))
            .await?;
        Ok(list.files)
    }

    async fn fetch_chess_grid(&self, complex: &str) -> CrmResult<Vec<GridRecord>> {
        let grid: ChessGrid = self
            .get_json(&format!("/excel/complexes/{}/chess", segment(complex)))
            .await?;
        Ok(grid.grid)
    }

    async fn save_chess_grid(&self, complex: &str, updates: &[StatusUpdate]) -> CrmResult<()> {
        let _: serde_json::Value = self
            .send_json(
                Method::PUT,
                &format!("/excel/complexes/{}/chess", segment(complex)),
                &ChessGridUpdate { updates },
            )
            .await?;
        info!(complex, count = updates.len(), "Chess grid statuses saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn query() -> ApartmentQuery {
        ApartmentQuery {
            complex_name: "ЖК_Рассвет".into(),
            block_name: "Блок А".into(),
            apartment_size: "55,67".into(),
            floor: "5".into(),
            apartment_number: "42".into(),
        }
    }

    #[test]
    fn test_categorize_files() {
        let files = ComplexFiles::categorize(vec![
            "rassvet_jk_data.xlsx".into(),
            "rassvet_price_shaxamtka.XLSX".into(),
            "contract_template.docx".into(),
            "notes.txt".into(),
        ]);
        assert_eq!(files.data, vec!["rassvet_jk_data.xlsx"]);
        assert_eq!(files.prices.len(), 1);
        assert_eq!(files.templates.len(), 1);
        assert_eq!(files.other, vec!["notes.txt"]);
    }

    #[test]
    fn test_status_update_wire_shape() {
        let update = StatusUpdate {
            complex_name: "ЖК_Бахор".into(),
            block_name: "1".into(),
            floor: "3".into(),
            apartment_number: "17".into(),
            new_status: UnitStatus::Booked,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(
            value,
            json!({
                "jkName": "ЖК_Бахор",
                "blockName": "1",
                "floor": "3",
                "apartmentNumber": "17",
                "newStatus": "бронь"
            })
        );
    }

    #[tokio::test]
    async fn test_apartment_info_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/complexes/apartment-info"))
            .and(query_param("jkName", "ЖК_Рассвет"))
            .and(query_param("apartmentSize", "55,67"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {
                    "pricePerM2_100": 9000000,
                    "pricePerM2_70": 9500000,
                    "pricePerM2_50": 10000000,
                    "pricePerM2_30": 10500000,
                    "total_price": 501030000,
                    "status": "свободна",
                    "floor": "5",
                    "size": "55,67",
                    "apartment_number": "42",
                    "months_left": 12
                }
            })))
            .mount(&server)
            .await;

        let client = CrmClient::with_base_url(&server.uri()).unwrap();
        let info = client.apartment_info(&query()).await.unwrap();
        assert_eq!(info.months_left, 12);
        assert_eq!(info.apartment_number, "42");
    }

    #[tokio::test]
    async fn test_apartment_info_error_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/complexes/apartment-info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "message": "Квартира не найдена"
            })))
            .mount(&server)
            .await;

        let client = CrmClient::with_base_url(&server.uri()).unwrap();
        let err = client.apartment_info(&query()).await.unwrap_err();
        assert!(err.to_string().contains("Квартира не найдена"));
    }

    #[tokio::test]
    async fn test_save_chess_grid_sends_batch() {
        let server = MockServer::start().await;
        let updates = vec![StatusUpdate {
            complex_name: "ЖК_Бахор".into(),
            block_name: "1".into(),
            floor: "2".into(),
            apartment_number: "8".into(),
            new_status: UnitStatus::Sold,
        }];
        Mock::given(method("PUT"))
            .and(path("/excel/complexes/%D0%96%D0%9A_%D0%91%D0%B0%D1%85%D0%BE%D1%80/chess"))
            .and(body_json(json!({
                "updates": [{
                    "jkName": "ЖК_Бахор",
                    "blockName": "1",
                    "floor": "2",
                    "apartmentNumber": "8",
                    "newStatus": "продана"
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = CrmClient::with_base_url(&server.uri()).unwrap();
        client.save_chess_grid("ЖК_Бахор", &updates).await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_board_missing_key_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = CrmClient::with_base_url(&server.uri()).unwrap();
        let rows = client.fetch_board("X").await.unwrap();
        assert!(rows.is_empty());
    }
}
