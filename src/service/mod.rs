pub mod chat_gateway;
