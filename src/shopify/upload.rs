use std::fmt;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{catalog, check_user_errors, queries, AdminClient, Connection, UserError};
use crate::config::Settings;
use crate::error::ShopifyError;
use crate::transform::ProductDraft;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Create,
    Categorize,
    Tag,
    TrackInventory,
    Activate,
    SetQuantity,
    Media,
    Publish,
    Collections,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Create => "create",
            Step::Categorize => "categorize",
            Step::Tag => "tag",
            Step::TrackInventory => "track_inventory",
            Step::Activate => "activate",
            Step::SetQuantity => "set_quantity",
            Step::Media => "media",
            Step::Publish => "publish",
            Step::Collections => "collections",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Done,
    Skipped(String),
    Failed(String),
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Done => "done",
            StepStatus::Skipped(_) => "skipped",
            StepStatus::Failed(_) => "failed",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            StepStatus::Done => None,
            StepStatus::Skipped(d) | StepStatus::Failed(d) => Some(d),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: Step,
    pub status: StepStatus,
}

#[derive(Debug, Clone)]
pub struct UploadReport {
    pub product_id: String,
    pub steps: Vec<StepOutcome>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        !self
            .steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed(_)))
    }
}

// ── Response shapes ──

#[derive(Debug, Deserialize)]
struct ProductSetData {
    #[serde(rename = "productSet")]
    product_set: ProductSetPayload,
}

#[derive(Debug, Deserialize)]
struct ProductSetPayload {
    product: Option<CreatedProduct>,
    #[serde(rename = "userErrors")]
    user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
struct CreatedProduct {
    id: String,
    variants: Connection<CreatedVariant>,
}

#[derive(Debug, Deserialize)]
struct CreatedVariant {
    #[serde(rename = "inventoryItem")]
    inventory_item: IdRef,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

/// Any mutation payload: only its user errors matter here.
#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(rename = "userErrors", alias = "mediaUserErrors", default)]
    user_errors: Vec<UserError>,
}

/// Runs the create-and-configure sequence against the target store.
/// Publication ids are looked up once and reused for every product.
pub struct Uploader<'a> {
    client: &'a AdminClient,
    location_id: Option<String>,
    category_id: String,
    default_stock: i64,
    publications: Option<Vec<String>>,
}

impl<'a> Uploader<'a> {
    pub fn new(client: &'a AdminClient, settings: &Settings) -> Self {
        Self {
            client,
            location_id: settings.location_id.clone(),
            category_id: settings.category_id.clone(),
            default_stock: settings.default_stock,
            publications: None,
        }
    }

    /// Create the product, then configure it. Only the create step is fatal;
    /// every later step reports its own outcome and the sequence continues.
    pub async fn upload(
        &mut self,
        draft: &ProductDraft,
        collection_ids: &[String],
    ) -> Result<UploadReport, ShopifyError> {
        let (product_id, inventory_items) = self.create(draft).await?;
        info!("Created {} as {}", draft.handle, product_id);

        let mut steps = vec![StepOutcome {
            step: Step::Create,
            status: StepStatus::Done,
        }];

        let result = self.categorize(&product_id).await;
        steps.push(outcome(Step::Categorize, result));

        let result = self.tag(&product_id, &draft.tags).await;
        steps.push(outcome(Step::Tag, result));

        match self.location_id.clone() {
            Some(location_id) => {
                let result = self.track_inventory(&inventory_items).await;
                steps.push(outcome(Step::TrackInventory, result));
                let result = self.activate(&inventory_items, &location_id).await;
                steps.push(outcome(Step::Activate, result));
                let result = self.set_quantity(&inventory_items, &location_id).await;
                steps.push(outcome(Step::SetQuantity, result));
            }
            None => {
                for step in [Step::TrackInventory, Step::Activate, Step::SetQuantity] {
                    steps.push(StepOutcome {
                        step,
                        status: StepStatus::Skipped("no location_id configured".into()),
                    });
                }
            }
        }

        let result = self.media(&product_id, draft).await;
        steps.push(outcome(Step::Media, result));

        let result = self.publish(&product_id).await;
        steps.push(outcome(Step::Publish, result));

        let result = self.collections(&product_id, collection_ids).await;
        steps.push(outcome(Step::Collections, result));

        Ok(UploadReport { product_id, steps })
    }

    async fn create(&self, draft: &ProductDraft) -> Result<(String, Vec<String>), ShopifyError> {
        let data: ProductSetData = self
            .client
            .execute(
                "productSet",
                queries::PRODUCT_SET,
                json!({ "product": draft.to_product_set_input() }),
            )
            .await?;
        let payload = data.product_set;
        check_user_errors("productSet", payload.user_errors)?;
        let product = payload.product.ok_or(ShopifyError::MissingData("productSet"))?;

        let items = product
            .variants
            .into_nodes()
            .into_iter()
            .map(|v| v.inventory_item.id)
            .collect();
        Ok((product.id, items))
    }

    async fn categorize(&self, product_id: &str) -> Result<StepStatus, ShopifyError> {
        self.mutate(
            "productUpdate",
            queries::PRODUCT_UPDATE,
            json!({ "product": { "id": product_id, "category": self.category_id } }),
        )
        .await?;
        Ok(StepStatus::Done)
    }

    async fn tag(&self, product_id: &str, tags: &[String]) -> Result<StepStatus, ShopifyError> {
        if tags.is_empty() {
            return Ok(StepStatus::Skipped("no tags".into()));
        }
        self.mutate("tagsAdd", queries::TAGS_ADD, json!({ "id": product_id, "tags": tags }))
            .await?;
        Ok(StepStatus::Done)
    }

    async fn track_inventory(&self, items: &[String]) -> Result<StepStatus, ShopifyError> {
        let mut failures = Vec::new();
        for item_id in items {
            let vars = json!({ "id": item_id, "input": { "tracked": true } });
            if let Err(e) = self
                .mutate("inventoryItemUpdate", queries::INVENTORY_ITEM_UPDATE, vars)
                .await
            {
                failures.push(format!("{}: {}", item_id, e));
            }
        }
        Ok(per_item_status(items.len(), failures))
    }

    async fn activate(&self, items: &[String], location_id: &str) -> Result<StepStatus, ShopifyError> {
        let mut failures = Vec::new();
        for item_id in items {
            let vars = json!({ "inventoryItemId": item_id, "locationId": location_id });
            if let Err(e) = self
                .mutate("inventoryActivate", queries::INVENTORY_ACTIVATE, vars)
                .await
            {
                failures.push(format!("{}: {}", item_id, e));
            }
        }
        Ok(per_item_status(items.len(), failures))
    }

    async fn set_quantity(
        &self,
        items: &[String],
        location_id: &str,
    ) -> Result<StepStatus, ShopifyError> {
        if items.is_empty() {
            return Ok(StepStatus::Skipped("no inventory items".into()));
        }
        let quantities: Vec<Value> = items
            .iter()
            .map(|id| {
                json!({
                    "inventoryItemId": id,
                    "locationId": location_id,
                    "quantity": self.default_stock,
                })
            })
            .collect();
        let vars = json!({
            "input": {
                "name": "available",
                "reason": "correction",
                "ignoreCompareQuantity": true,
                "quantities": quantities,
            }
        });
        self.mutate("inventorySetQuantities", queries::INVENTORY_SET_QUANTITIES, vars)
            .await?;
        Ok(StepStatus::Done)
    }

    async fn media(&self, product_id: &str, draft: &ProductDraft) -> Result<StepStatus, ShopifyError> {
        if draft.media.is_empty() {
            return Ok(StepStatus::Skipped("no images".into()));
        }
        self.mutate(
            "productCreateMedia",
            queries::PRODUCT_CREATE_MEDIA,
            json!({ "productId": product_id, "media": draft.media }),
        )
        .await?;
        Ok(StepStatus::Done)
    }

    async fn publish(&mut self, product_id: &str) -> Result<StepStatus, ShopifyError> {
        let publications = match &self.publications {
            Some(ids) => ids.clone(),
            None => {
                let ids = catalog::publication_ids(self.client).await?;
                self.publications = Some(ids.clone());
                ids
            }
        };
        if publications.is_empty() {
            return Ok(StepStatus::Skipped("store has no publications".into()));
        }
        let targets: Vec<Value> = publications
            .iter()
            .map(|id| json!({ "publicationId": id }))
            .collect();
        self.mutate(
            "productPublish",
            queries::PRODUCT_PUBLISH,
            json!({ "input": { "id": product_id, "productPublications": targets } }),
        )
        .await?;
        Ok(StepStatus::Done)
    }

    async fn collections(
        &self,
        product_id: &str,
        collection_ids: &[String],
    ) -> Result<StepStatus, ShopifyError> {
        if collection_ids.is_empty() {
            return Ok(StepStatus::Skipped("no collections selected".into()));
        }
        let mut failures = Vec::new();
        for collection_id in collection_ids {
            let vars = json!({ "id": collection_id, "productIds": [product_id] });
            if let Err(e) = self
                .mutate("collectionAddProducts", queries::COLLECTION_ADD_PRODUCTS, vars)
                .await
            {
                warn!("Error adding to collection {}: {}", collection_id, e);
                failures.push(format!("{}: {}", collection_id, e));
            }
        }
        Ok(per_item_status(collection_ids.len(), failures))
    }

    /// Execute a mutation whose payload sits under the operation name.
    async fn mutate(&self, op: &'static str, query: &str, vars: Value) -> Result<(), ShopifyError> {
        let data: Value = self.client.execute(op, query, vars).await?;
        let payload = data.get(op).cloned().ok_or(ShopifyError::MissingData(op))?;
        let payload: Payload =
            serde_json::from_value(payload).map_err(|source| ShopifyError::Decode { op, source })?;
        check_user_errors(op, payload.user_errors)
    }
}

fn outcome(step: Step, result: Result<StepStatus, ShopifyError>) -> StepOutcome {
    let status = match result {
        Ok(status) => status,
        Err(e) => {
            warn!("{} failed: {}", step, e);
            StepStatus::Failed(e.to_string())
        }
    };
    StepOutcome { step, status }
}

fn per_item_status(total: usize, failures: Vec<String>) -> StepStatus {
    if total == 0 {
        StepStatus::Skipped("nothing to do".into())
    } else if failures.is_empty() {
        StepStatus::Done
    } else {
        StepStatus::Failed(format!(
            "{}/{} failed: {}",
            failures.len(),
            total,
            failures.join("; ")
        ))
    }
}
