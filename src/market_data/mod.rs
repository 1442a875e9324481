// Market data module entrypoint
pub mod layout;     // byte-column layout of the exchange file
pub mod normaliser; // converts fixed-width column text -> dates/prices/quantities
pub mod decoder;    // file -> QuoteRow records + decode report
pub mod pipeline;   // decode -> cache store (batch write path)
