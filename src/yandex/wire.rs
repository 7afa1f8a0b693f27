//! Request and response envelopes that only exist on the wire.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::{Cloud, Folder, Instance, Subnet};

/// One page of a list response.
pub(crate) trait Page: DeserializeOwned {
    type Item;

    /// Splits the page into its items and the token of the next page; an
    /// empty token marks the last page.
    fn into_parts(self) -> (Vec<Self::Item>, String);
}

macro_rules! list_page {
    ($name:ident, $field:ident, $item:ty) => {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub(crate) struct $name {
            #[serde(default)]
            $field: Vec<$item>,
            #[serde(default)]
            next_page_token: String,
        }

        impl Page for $name {
            type Item = $item;

            fn into_parts(self) -> (Vec<Self::Item>, String) {
                (self.$field, self.next_page_token)
            }
        }
    };
}

list_page!(CloudPage, clouds, Cloud);
list_page!(FolderPage, folders, Folder);
list_page!(SubnetPage, subnets, Subnet);
list_page!(InstancePage, instances, Instance);

/// Body of `POST /iam/v1/tokens`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum IamTokenRequest<'a> {
    YandexPassportOauthToken(&'a str),
    Jwt(&'a str),
}

/// Response of `POST /iam/v1/tokens`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IamTokenResponse {
    pub(crate) iam_token: String,
}

/// Error body returned by the REST gateway.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub(crate) code: i32,
    #[serde(default)]
    pub(crate) message: String,
}
