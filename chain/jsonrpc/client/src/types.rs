use consortium_network_configs::Address;
use serde::{Deserialize, Serialize};

/// Parameters of `eth_sendTransaction`; the node signs with the unlocked `from` account.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    /// Absent for contract creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    /// `0x`-prefixed hex payload.
    pub data: String,
    /// Hex quantity; estimated by the node when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
}

impl TransactionRequest {
    pub fn create(from: Address, code: &[u8]) -> Self {
        TransactionRequest { from, to: None, data: to_hex(code), gas: None }
    }

    pub fn call(from: Address, to: Address, input: &[u8]) -> Self {
        TransactionRequest { from, to: Some(to), data: to_hex(input), gas: None }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// `0x1` on success, `0x0` when the transaction reverted.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
}

impl TransactionReceipt {
    /// Pre-Byzantium receipts carry no status and are treated as successful.
    pub fn succeeded(&self) -> bool {
        !matches!(self.status.as_deref(), Some("0x0"))
    }
}

fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_request_has_no_recipient() {
        let from: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        let value = serde_json::to_value(TransactionRequest::create(from, &[0x60, 0x80])).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "from": "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
                "data": "0x6080",
            })
        );
    }

    #[test]
    fn call_request_encodes_input() {
        let from: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        let to: Address = "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359".parse().unwrap();
        let request = TransactionRequest::call(from, to, &[0x0a, 0xff, 0x00]);
        assert_eq!(request.data, "0x0aff00");
        assert_eq!(TransactionRequest::create(from, &[]).data, "0x");
    }

    #[test]
    fn receipt() {
        let receipt: TransactionReceipt = serde_json::from_str(
            r#"{
                "transactionHash": "0xabc",
                "contractAddress": "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359",
                "status": "0x1",
                "blockNumber": "0x10",
                "gasUsed": "0x5208"
            }"#,
        )
        .unwrap();
        assert!(receipt.succeeded());
        assert_eq!(
            receipt.contract_address.unwrap().to_string(),
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359"
        );

        let reverted: TransactionReceipt =
            serde_json::from_str(r#"{"transactionHash": "0xabc", "contractAddress": null, "status": "0x0"}"#)
                .unwrap();
        assert!(!reverted.succeeded());
        assert_eq!(reverted.contract_address, None);
    }
}
