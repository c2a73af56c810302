//! GraphQL documents for the Admin API operations the uploader issues.

pub const CATALOG: &str = r#"
{
  collections(first: 100) {
    edges {
      node {
        id
        title
        ruleSet {
          rules {
            column
          }
        }
      }
    }
  }
  shop {
    productTags(first: 250) {
      edges {
        node
      }
    }
  }
}
"#;

pub const PUBLICATIONS: &str = r#"
{
  publications(first: 20) {
    edges {
      node {
        id
      }
    }
  }
}
"#;

pub const PRODUCT_SET: &str = r#"
mutation productSet($product: ProductSetInput!) {
  productSet(input: $product) {
    product {
      id
      variants(first: 100) {
        edges {
          node {
            id
            inventoryItem {
              id
            }
          }
        }
      }
    }
    userErrors {
      field
      message
    }
  }
}
"#;

pub const PRODUCT_UPDATE: &str = r#"
mutation productUpdate($product: ProductUpdateInput!) {
  productUpdate(product: $product) {
    product { id }
    userErrors { field message }
  }
}
"#;

pub const TAGS_ADD: &str = r#"
mutation tagsAdd($id: ID!, $tags: [String!]!) {
  tagsAdd(id: $id, tags: $tags) {
    node { id }
    userErrors { field message }
  }
}
"#;

pub const INVENTORY_ITEM_UPDATE: &str = r#"
mutation inventoryItemUpdate($id: ID!, $input: InventoryItemInput!) {
  inventoryItemUpdate(id: $id, input: $input) {
    inventoryItem { id tracked }
    userErrors { field message }
  }
}
"#;

pub const INVENTORY_ACTIVATE: &str = r#"
mutation inventoryActivate($inventoryItemId: ID!, $locationId: ID!) {
  inventoryActivate(inventoryItemId: $inventoryItemId, locationId: $locationId) {
    userErrors { field message }
  }
}
"#;

pub const INVENTORY_SET_QUANTITIES: &str = r#"
mutation inventorySetQuantities($input: InventorySetQuantitiesInput!) {
  inventorySetQuantities(input: $input) {
    userErrors { field message }
  }
}
"#;

pub const PRODUCT_CREATE_MEDIA: &str = r#"
mutation productCreateMedia($productId: ID!, $media: [CreateMediaInput!]!) {
  productCreateMedia(productId: $productId, media: $media) {
    media { id status }
    mediaUserErrors { field message }
  }
}
"#;

pub const PRODUCT_PUBLISH: &str = r#"
mutation PublishProduct($input: ProductPublishInput!) {
  productPublish(input: $input) {
    product { id }
    userErrors { field message }
  }
}
"#;

pub const COLLECTION_ADD_PRODUCTS: &str = r#"
mutation collectionAddProducts($id: ID!, $productIds: [ID!]!) {
  collectionAddProducts(id: $id, productIds: $productIds) {
    collection { id }
    userErrors { field message }
  }
}
"#;
