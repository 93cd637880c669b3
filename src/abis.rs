use ethers::contract::abigen;

abigen!(
    Erc1967Proxy,
    r#"[
        function upgradeToAndCall(address newImplementation, bytes data) public payable
    ]"#
);

abigen!(
    Erc20Metadata,
    r#"[
        function name() public view returns (string)
        function symbol() public view returns (string)
    ]"#
);
