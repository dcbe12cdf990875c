// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Built-in ABIs of the verifier and registry contracts, used when no
//! Hardhat artifact is configured

pub const VERIFIER_ABI: &str = r#"[
  {
    "type": "function",
    "name": "submitModelProof",
    "stateMutability": "nonpayable",
    "inputs": [
      {"name": "_modelCommitment", "type": "bytes32"},
      {"name": "_a_acc", "type": "uint256[2]"},
      {"name": "_b_acc", "type": "uint256[2][2]"},
      {"name": "_c_acc", "type": "uint256[2]"},
      {"name": "_inputs_acc", "type": "uint256[]"},
      {"name": "_a_rmse", "type": "uint256[2]"},
      {"name": "_b_rmse", "type": "uint256[2][2]"},
      {"name": "_c_rmse", "type": "uint256[2]"},
      {"name": "_inputs_rmse", "type": "uint256[]"}
    ],
    "outputs": [{"name": "", "type": "uint256"}]
  },
  {
    "type": "function",
    "name": "submitSensorProof",
    "stateMutability": "nonpayable",
    "inputs": [
      {"name": "_dataCommitment", "type": "bytes32"},
      {"name": "_a_valid", "type": "uint256[2]"},
      {"name": "_b_valid", "type": "uint256[2][2]"},
      {"name": "_c_valid", "type": "uint256[2]"},
      {"name": "_inputs_valid", "type": "uint256[]"},
      {"name": "_a_range", "type": "uint256[2]"},
      {"name": "_b_range", "type": "uint256[2][2]"},
      {"name": "_c_range", "type": "uint256[2]"},
      {"name": "_inputs_range", "type": "uint256[]"}
    ],
    "outputs": [{"name": "", "type": "uint256"}]
  },
  {
    "type": "function",
    "name": "submitPredictionProof",
    "stateMutability": "nonpayable",
    "inputs": [
      {"name": "_outputCommitment", "type": "bytes32"},
      {"name": "_a_comp", "type": "uint256[2]"},
      {"name": "_b_comp", "type": "uint256[2][2]"},
      {"name": "_c_comp", "type": "uint256[2]"},
      {"name": "_inputs_comp", "type": "uint256[]"},
      {"name": "_a_cons", "type": "uint256[2]"},
      {"name": "_b_cons", "type": "uint256[2][2]"},
      {"name": "_c_cons", "type": "uint256[2]"},
      {"name": "_inputs_cons", "type": "uint256[]"}
    ],
    "outputs": [{"name": "", "type": "uint256"}]
  },
  {
    "type": "event",
    "name": "ProofSubmitted",
    "anonymous": false,
    "inputs": [
      {"name": "proofId", "type": "uint256", "indexed": true},
      {"name": "commitment", "type": "bytes32", "indexed": true},
      {"name": "submitter", "type": "address", "indexed": false}
    ]
  }
]"#;

pub const REGISTRY_ABI: &str = r#"[
  {
    "type": "function",
    "name": "registerZKModel",
    "stateMutability": "nonpayable",
    "inputs": [
      {"name": "_modelCommitment", "type": "bytes32"},
      {"name": "_modelType", "type": "string"},
      {"name": "_domainType", "type": "string"},
      {"name": "_claimedAccuracy", "type": "uint256"},
      {"name": "_claimedRmse", "type": "uint256"},
      {"name": "_zkProofId", "type": "uint256"}
    ],
    "outputs": [{"name": "", "type": "uint256"}]
  },
  {
    "type": "function",
    "name": "submitZKSensorData",
    "stateMutability": "nonpayable",
    "inputs": [
      {"name": "_dataCommitment", "type": "bytes32"},
      {"name": "_machineType", "type": "string"},
      {"name": "_dataCount", "type": "uint256"},
      {"name": "_metadataHash", "type": "bytes32"},
      {"name": "_zkProofId", "type": "uint256"}
    ],
    "outputs": [{"name": "", "type": "uint256"}]
  },
  {
    "type": "function",
    "name": "makeZKPrediction",
    "stateMutability": "nonpayable",
    "inputs": [
      {"name": "_modelId", "type": "uint256"},
      {"name": "_sensorDataId", "type": "uint256"},
      {"name": "_inputCommitment", "type": "bytes32"},
      {"name": "_outputCommitment", "type": "bytes32"},
      {"name": "_confidenceScore", "type": "uint256"},
      {"name": "_zkProofId", "type": "uint256"}
    ],
    "outputs": [{"name": "", "type": "uint256"}]
  },
  {
    "type": "function",
    "name": "totalUsers",
    "stateMutability": "view",
    "inputs": [],
    "outputs": [{"name": "", "type": "uint256"}]
  },
  {
    "type": "function",
    "name": "engineerCount",
    "stateMutability": "view",
    "inputs": [],
    "outputs": [{"name": "", "type": "uint256"}]
  },
  {
    "type": "function",
    "name": "dataCounter",
    "stateMutability": "view",
    "inputs": [],
    "outputs": [{"name": "", "type": "uint256"}]
  },
  {
    "type": "function",
    "name": "modelCounter",
    "stateMutability": "view",
    "inputs": [],
    "outputs": [{"name": "", "type": "uint256"}]
  },
  {
    "type": "event",
    "name": "ModelRegistered",
    "anonymous": false,
    "inputs": [
      {"name": "modelId", "type": "uint256", "indexed": true},
      {"name": "modelCommitment", "type": "bytes32", "indexed": true},
      {"name": "owner", "type": "address", "indexed": false}
    ]
  },
  {
    "type": "event",
    "name": "SensorDataSubmitted",
    "anonymous": false,
    "inputs": [
      {"name": "dataId", "type": "uint256", "indexed": true},
      {"name": "dataCommitment", "type": "bytes32", "indexed": true},
      {"name": "submitter", "type": "address", "indexed": false}
    ]
  },
  {
    "type": "event",
    "name": "PredictionRecorded",
    "anonymous": false,
    "inputs": [
      {"name": "predictionId", "type": "uint256", "indexed": true},
      {"name": "modelId", "type": "uint256", "indexed": true},
      {"name": "outputCommitment", "type": "bytes32", "indexed": false}
    ]
  }
]"#;
