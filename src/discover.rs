use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::fetch::Storefront;
use crate::parser::ProductUrl;

static PRODUCT_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/products/"]"#).unwrap());
static NEXT_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"link[rel="next"], a[rel="next"]"#).unwrap());

const PRODUCT_SITEMAP_MARKER: &str = "sitemap_products";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Product,
    Collection,
    Sitemap,
}

impl InputKind {
    pub fn classify(url: &str) -> Self {
        let path = Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| url.to_string());
        if path.contains("/products/") {
            InputKind::Product
        } else if path.ends_with(".xml") {
            InputKind::Sitemap
        } else {
            InputKind::Collection
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Product => "product",
            InputKind::Collection => "collection",
            InputKind::Sitemap => "sitemap",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product links on a collection page that stay on the page's host, as
/// canonical `{origin}/products/{handle}` URLs in first-seen order.
pub fn collection_product_urls(page_url: &str, html: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();

    doc.select(&PRODUCT_LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|u| u.host_str() == base.host_str())
        .filter_map(|u| ProductUrl::parse(u.as_str()).ok())
        .map(|p| p.canonical())
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// Canonical product URLs in first-seen order; non-product URLs are dropped.
pub fn canonical_product_urls<I>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter_map(|u| ProductUrl::parse(&u).ok())
        .map(|p| p.canonical())
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// Pagination link of a collection page, if the theme exposes one.
pub fn next_page_url(page_url: &str, html: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let doc = Html::parse_document(html);
    let href = doc
        .select(&NEXT_LINK)
        .find_map(|e| e.value().attr("href"))?;
    base.join(href.trim()).ok().map(String::from)
}

/// Walk a collection, following `rel=next` up to `max_pages` pages.
pub async fn scrape_collection(
    client: &Storefront,
    collection_url: &str,
    max_pages: usize,
) -> Result<Vec<String>> {
    info!("Scraping collection: {}", collection_url);
    let mut urls = Vec::new();
    let mut seen = HashSet::new();
    let mut visited = HashSet::new();
    let mut next = Some(collection_url.to_string());

    while let Some(page_url) = next.take() {
        if visited.len() >= max_pages || !visited.insert(page_url.clone()) {
            break;
        }
        let html = client
            .get_text(&page_url)
            .await
            .with_context(|| format!("Failed to fetch collection page {}", page_url))?;

        let found = collection_product_urls(&page_url, &html);
        let before = urls.len();
        urls.extend(found.into_iter().filter(|u| seen.insert(u.clone())));
        info!("{}: {} new product links", page_url, urls.len() - before);

        next = next_page_url(&page_url, &html);
    }

    info!("Found {} products.", urls.len());
    Ok(urls)
}

#[derive(Debug, PartialEq, Eq)]
pub enum Sitemap {
    UrlSet(Vec<String>),
    Index(Vec<String>),
}

/// Parse either a `<urlset>` or a `<sitemapindex>` and return its `<loc>`s.
pub fn parse_sitemap(xml: &str) -> Result<Sitemap> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut locs = Vec::new();
    let mut is_index = false;
    let mut in_entry = false;
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.name().as_ref() {
                b"sitemapindex" => is_index = true,
                b"url" | b"sitemap" => in_entry = true,
                b"loc" if in_entry => in_loc = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(e)) if in_loc => {
                let loc = e.unescape()?.trim().to_string();
                if !loc.is_empty() {
                    locs.push(loc);
                }
            }
            Ok(quick_xml::events::Event::CData(e)) if in_loc => {
                let loc = String::from_utf8_lossy(&e.into_inner()).trim().to_string();
                if !loc.is_empty() {
                    locs.push(loc);
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.name().as_ref() {
                b"loc" => in_loc = false,
                b"url" | b"sitemap" => in_entry = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(if is_index {
        Sitemap::Index(locs)
    } else {
        Sitemap::UrlSet(locs)
    })
}

/// Product URLs from a store sitemap. An index is expanded through its
/// product sitemaps only.
pub async fn scrape_sitemap(client: &Storefront, sitemap_url: &str) -> Result<Vec<String>> {
    info!("Fetching sitemap: {}", sitemap_url);
    let xml = client
        .get_text(sitemap_url)
        .await
        .with_context(|| format!("Failed to fetch sitemap {}", sitemap_url))?;

    let locs = match parse_sitemap(&xml)? {
        Sitemap::UrlSet(locs) => locs,
        Sitemap::Index(children) => {
            let mut locs = Vec::new();
            for child in children.iter().filter(|c| c.contains(PRODUCT_SITEMAP_MARKER)) {
                info!("Fetching child sitemap: {}", child);
                match client.get_text(child).await {
                    Ok(xml) => match parse_sitemap(&xml)? {
                        Sitemap::UrlSet(child_locs) => locs.extend(child_locs),
                        Sitemap::Index(_) => warn!("Nested sitemap index ignored: {}", child),
                    },
                    Err(e) => warn!("Skipping child sitemap {}: {}", child, e),
                }
            }
            locs
        }
    };

    let urls = canonical_product_urls(locs);
    info!("Product pages in sitemap: {}", urls.len());
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn classify_inputs() {
        assert_eq!(InputKind::classify("https://a.com/products/x"), InputKind::Product);
        assert_eq!(
            InputKind::classify("https://a.com/collections/lawn/products/x?v=1"),
            InputKind::Product
        );
        assert_eq!(InputKind::classify("https://a.com/collections/lawn"), InputKind::Collection);
        assert_eq!(InputKind::classify("https://a.com/sitemap.xml"), InputKind::Sitemap);
    }

    #[test]
    fn collection_links_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/collection_page.html").unwrap();
        let urls = collection_product_urls("https://www.mariab.pk/collections/luxury-lawn", &html);
        assert_eq!(
            urls,
            vec![
                "https://www.mariab.pk/products/embroidered-lawn-suit",
                "https://www.mariab.pk/products/printed-shirt",
                "https://www.mariab.pk/products/chiffon-dupatta",
            ]
        );
        assert_eq!(
            next_page_url("https://www.mariab.pk/collections/luxury-lawn", &html).as_deref(),
            Some("https://www.mariab.pk/collections/luxury-lawn?page=2")
        );
    }

    #[test]
    fn collection_links_collapse_to_one_url_per_product() {
        let html = r#"
            <a href="/collections/lawn/products/embroidered-lawn-suit">Suit</a>
            <a href="/products/embroidered-lawn-suit?variant=7">Suit</a>
            <a href="https://other-store.com/products/embroidered-lawn-suit">Elsewhere</a>
        "#;
        let urls = collection_product_urls("https://www.mariab.pk/collections/lawn", html);
        assert_eq!(urls, vec!["https://www.mariab.pk/products/embroidered-lawn-suit"]);
    }

    #[test]
    fn canonical_urls_dedup_by_handle() {
        let urls = canonical_product_urls(vec![
            "https://a.com/products/x".to_string(),
            "https://a.com/collections/c/products/x".to_string(),
            "https://a.com/pages/about".to_string(),
            "https://a.com/products/y.js".to_string(),
        ]);
        assert_eq!(urls, vec!["https://a.com/products/x", "https://a.com/products/y"]);
    }

    #[test]
    fn sitemap_index_and_urlset() {
        let index = r#"<?xml version="1.0" encoding="UTF-8"?>
            <sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <sitemap><loc>https://a.com/sitemap_products_1.xml?from=1&amp;to=9</loc></sitemap>
              <sitemap><loc>https://a.com/sitemap_pages_1.xml</loc></sitemap>
            </sitemapindex>"#;
        assert_eq!(
            parse_sitemap(index).unwrap(),
            Sitemap::Index(vec![
                "https://a.com/sitemap_products_1.xml?from=1&to=9".into(),
                "https://a.com/sitemap_pages_1.xml".into(),
            ])
        );

        let urlset = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
                         xmlns:image="http://www.google.com/schemas/sitemap-image/1.1">
              <url><loc>https://a.com/</loc></url>
              <url><loc>https://a.com/products/x</loc>
                <image:image><image:loc>https://cdn/x.jpg</image:loc></image:image></url>
            </urlset>"#;
        let Sitemap::UrlSet(locs) = parse_sitemap(urlset).unwrap() else {
            panic!("expected urlset");
        };
        assert_eq!(locs, vec!["https://a.com/", "https://a.com/products/x"]);
    }

    #[tokio::test]
    async fn collection_pagination_is_bounded() {
        let server = MockServer::start().await;
        let page = |n: u32| {
            format!(
                r#"<a href="/products/p{n}">P</a><link rel="next" href="/collections/c?page={}">"#,
                n + 1
            )
        };
        Mock::given(method("GET"))
            .and(path("/collections/c"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(2)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/collections/c"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(1)))
            .mount(&server)
            .await;

        let client = Storefront::new(&test_settings("example.com")).unwrap();
        let start = format!("{}/collections/c", server.uri());

        let one = scrape_collection(&client, &start, 1).await.unwrap();
        assert_eq!(one, vec![format!("{}/products/p1", server.uri())]);

        let two = scrape_collection(&client, &start, 2).await.unwrap();
        assert_eq!(
            two,
            vec![
                format!("{}/products/p1", server.uri()),
                format!("{}/products/p2", server.uri()),
            ]
        );
    }

    #[tokio::test]
    async fn sitemap_index_follows_product_sitemaps() {
        let server = MockServer::start().await;
        let index = format!(
            r#"<sitemapindex>
                 <sitemap><loc>{0}/sitemap_products_1.xml</loc></sitemap>
                 <sitemap><loc>{0}/sitemap_blogs_1.xml</loc></sitemap>
               </sitemapindex>"#,
            server.uri()
        );
        let products = format!(
            r#"<urlset><url><loc>{0}/</loc></url>
                 <url><loc>{0}/products/a</loc></url>
                 <url><loc>{0}/products/a</loc></url></urlset>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap_products_1.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(products))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap_blogs_1.xml"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = Storefront::new(&test_settings("example.com")).unwrap();
        let urls = scrape_sitemap(&client, &format!("{}/sitemap.xml", server.uri()))
            .await
            .unwrap();
        assert_eq!(urls, vec![format!("{}/products/a", server.uri())]);
    }
}
