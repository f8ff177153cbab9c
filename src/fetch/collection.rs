use crate::{
    error::Error,
    fetch::FederationClient,
    http_signatures::KeyMaterial,
    protocol::document::Document,
};
use tracing::debug;

/// Number of pages read by [FederationClient::get_all_pages_in_collection] unless specified
pub const DEFAULT_PAGE_LIMIT: usize = 5;

impl FederationClient {
    /// Fetch the first page of `collection`. Empty if the collection has no `first` page.
    pub async fn get_first_page_in_collection(
        &self,
        collection: &Document,
        key: Option<&KeyMaterial>,
    ) -> Result<Document, Error> {
        self.fetch_page(collection.first(), key).await
    }

    /// Fetch the page after `page`. Empty if there is no `next` page.
    pub async fn get_next_page(
        &self,
        page: &Document,
        key: Option<&KeyMaterial>,
    ) -> Result<Document, Error> {
        self.fetch_page(page.next(), key).await
    }

    /// Fetch the page before `page`. Empty if there is no `prev` page.
    pub async fn get_previous_page(
        &self,
        page: &Document,
        key: Option<&KeyMaterial>,
    ) -> Result<Document, Error> {
        self.fetch_page(page.prev(), key).await
    }

    /// Read pages of `collection`, starting with `first` and following `next` links.
    ///
    /// At most `limit` pages are fetched, so a cyclic or endless chain of pages ends after
    /// `limit` requests. Reading also stops at a page without `next`, or at a response which is
    /// not a JSON object.
    pub async fn get_all_pages_in_collection(
        &self,
        collection: &Document,
        key: Option<&KeyMaterial>,
        limit: usize,
    ) -> Result<Vec<Document>, Error> {
        let mut pages = Vec::new();
        let Some(first) = collection.first() else {
            return Ok(pages);
        };
        let Some(mut page) = self.fetch_document(first, key).await? else {
            return Ok(pages);
        };

        while let Some(next) = page.next().map(str::to_string) {
            pages.push(page);
            if pages.len() >= limit {
                debug!("Stopped reading collection after {limit} pages");
                return Ok(pages);
            }
            match self.fetch_document(&next, key).await? {
                Some(next_page) => page = next_page,
                None => return Ok(pages),
            }
        }
        pages.push(page);
        Ok(pages)
    }

    async fn fetch_page(
        &self,
        link: Option<&str>,
        key: Option<&KeyMaterial>,
    ) -> Result<Document, Error> {
        match link {
            Some(url) => Ok(self.fetch_document(url, key).await?.unwrap_or_default()),
            None => Ok(Document::default()),
        }
    }
}
