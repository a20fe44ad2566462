pub mod generated {
    pub mod metaserver {
        include!("./generated/metaserver.rs");
    }
    pub mod datanode {
        include!("./generated/datanode.rs");
    }
}
